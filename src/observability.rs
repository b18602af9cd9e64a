//! Process-wide counters for the detection pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    batches: AtomicU64,
    images_processed: AtomicU64,
    videos_processed: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    inference_timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_received(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "batches", "Metric incremented");
    }

    pub fn image_processed(&self) {
        self.images_processed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "images_processed", "Metric incremented");
    }

    pub fn video_processed(&self) {
        self.videos_processed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "videos_processed", "Metric incremented");
    }

    pub fn file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "files_skipped", "Metric incremented");
    }

    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "files_failed", "Metric incremented");
    }

    pub fn inference_timed_out(&self) {
        self.inference_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "inference_timeouts", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            images_processed: self.images_processed.load(Ordering::Relaxed),
            videos_processed: self.videos_processed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            inference_timeouts: self.inference_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub batches: u64,
    pub images_processed: u64,
    pub videos_processed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub inference_timeouts: u64,
}
