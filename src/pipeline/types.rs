use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One file part of an upload batch
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Client-supplied name, only used for its extension
    pub filename: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// A labeled, scored box on an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub label: String,
    /// Rounded to 3 decimals
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` exactly as reported by the model
    pub bbox: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub input: String,
    pub output: String,
    pub detections: Vec<Detection>,
    #[serde(rename = "disease_percent")]
    pub diseased_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub input: String,
    pub annotated_video: String,
}

/// One element of the `/detect` response array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileResult {
    Image(ImageResult),
    Video(VideoResult),
}

/// Results of one batch plus the counts of files that produced none
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<FileResult>,
    pub skipped: usize,
    pub failed: usize,
}
