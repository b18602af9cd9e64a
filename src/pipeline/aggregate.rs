//! Area-weighted aggregation of image detections

use std::collections::BTreeMap;

use super::types::Detection;
use crate::detector::RawDetection;

/// Class whose area counts towards the diseased percentage (case-sensitive)
pub const DISEASED_LABEL: &str = "diseased";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnalysis {
    /// In model order
    pub detections: Vec<Detection>,
    pub total_area: f64,
    pub diseased_area: f64,
    /// In [0, 100], rounded to 2 decimals; 0 when nothing was detected
    pub diseased_percent: f64,
}

/// Resolve labels and compute the diseased share of detected area
pub fn aggregate(labels: &BTreeMap<usize, String>, raw: &[RawDetection]) -> ImageAnalysis {
    let mut total_area = 0.0;
    let mut diseased_area = 0.0;
    let mut detections = Vec::with_capacity(raw.len());

    for det in raw {
        let label = labels
            .get(&det.class_index)
            .cloned()
            .unwrap_or_else(|| det.class_index.to_string());

        let area = box_area(&det.bbox);
        total_area += area;
        if label == DISEASED_LABEL {
            diseased_area += area;
        }

        detections.push(Detection {
            label,
            confidence: round_to(det.confidence, 3),
            bbox: det.bbox,
        });
    }

    let diseased_percent = if total_area > 0.0 {
        round_to(diseased_area / total_area * 100.0, 2)
    } else {
        0.0
    };

    ImageAnalysis {
        detections,
        total_area,
        diseased_area,
        diseased_percent,
    }
}

/// Width times height with negative (or NaN) sides treated as 0
fn box_area(bbox: &[f64; 4]) -> f64 {
    let width = (bbox[2] - bbox[0]).max(0.0);
    let height = (bbox[3] - bbox[1]).max(0.0);
    width * height
}

/// Decimal rounding on the exact binary value, ties to even
///
/// Goes through the correctly rounded decimal formatter, so the exact tie
/// `0.8125` becomes `0.812` and `0.6875` becomes `0.688`.
fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}
