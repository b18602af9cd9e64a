//! Extension-based media classification

use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Look up a lowercase, dot-prefixed extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&extension) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Lowercased extension of `filename` including the leading dot
///
/// Dotfiles such as `.png` have no extension.
pub fn normalized_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// `None` means unsupported: the file is skipped, not an error
pub fn classify(filename: &str) -> Option<MediaKind> {
    normalized_extension(filename).and_then(|ext| MediaKind::from_extension(&ext))
}
