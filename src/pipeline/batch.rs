//! Sequential per-file processing of an upload batch

use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::aggregate::aggregate;
use super::annotate::{self, AnnotateError};
use super::error::FileError;
use super::types::{BatchOutcome, FileResult, ImageResult, UploadFile, VideoResult};
use crate::config::DetectorConfig;
use crate::detector::{Detector, DetectorError, InferenceOptions, VideoDestination};
use crate::media::{self, MediaKind};
use crate::observability::Metrics;
use crate::storage::{ArtifactId, ArtifactStore};

/// Drives each upload through classify -> persist -> detect -> aggregate
///
/// Files of one batch are handled strictly one after another. Detector calls
/// from all batches share one semaphore, so with a single permit the model is
/// never invoked concurrently.
pub struct BatchProcessor {
    store: Arc<ArtifactStore>,
    detector: Arc<dyn Detector>,
    options: InferenceOptions,
    inference_timeout: Duration,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<ArtifactStore>,
        detector: Arc<dyn Detector>,
        config: &DetectorConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            detector,
            options: InferenceOptions {
                image_size: config.image_size,
                confidence_threshold: config.confidence_threshold,
            },
            inference_timeout: config.inference_timeout.as_duration(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_inferences.max(1))),
            metrics,
        }
    }

    /// Process every file in order; unsupported and failed files are left out
    pub async fn handle_batch(&self, files: Vec<UploadFile>) -> BatchOutcome {
        self.metrics.batch_received();
        let mut outcome = BatchOutcome::default();

        for file in &files {
            match self.process_file(file).await {
                Ok(result) => outcome.results.push(result),
                Err(err) if err.is_skip() => {
                    info!(filename = %file.filename, "Skipping unsupported file");
                    self.metrics.file_skipped();
                    outcome.skipped += 1;
                }
                Err(err) => {
                    warn!(
                        filename = %file.filename,
                        code = err.code(),
                        retryable = err.is_retryable(),
                        error = %err,
                        "File processing failed"
                    );
                    if matches!(err, FileError::InferenceTimeout(_)) {
                        self.metrics.inference_timed_out();
                    }
                    self.metrics.file_failed();
                    outcome.failed += 1;
                }
            }
        }

        info!(
            files = files.len(),
            results = outcome.results.len(),
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Batch complete"
        );
        outcome
    }

    /// Run one file through the pipeline
    pub async fn process_file(&self, file: &UploadFile) -> Result<FileResult, FileError> {
        let unsupported = || FileError::UnsupportedMediaType(file.filename.clone());
        let kind = media::classify(&file.filename).ok_or_else(unsupported)?;
        let extension = media::normalized_extension(&file.filename).ok_or_else(unsupported)?;

        // bytes hit the disk before the detector sees them
        let (id, input) = self
            .store
            .store_upload(&extension, file.data.clone())
            .await
            .map_err(FileError::UploadPersist)?;

        info!(
            artifact_id = %id,
            filename = %file.filename,
            kind = kind.as_str(),
            size = file.data.len(),
            "Upload stored"
        );

        match kind {
            MediaKind::Image => self.process_image(&id, &extension, input, file.data.clone()).await,
            MediaKind::Video => self.process_video(&id, input).await,
        }
    }

    async fn process_image(
        &self,
        id: &ArtifactId,
        extension: &str,
        input: PathBuf,
        data: Bytes,
    ) -> Result<FileResult, FileError> {
        let detector = self.detector.clone();
        let options = self.options;
        let source = input.clone();
        let inference = self
            .infer(async move { detector.detect_image(&source, &options).await })
            .await?;
        let analysis = aggregate(&inference.labels, &inference.detections);

        let rendered = {
            let detections = analysis.detections.clone();
            let extension = extension.to_string();
            tokio::task::spawn_blocking(move || annotate::render(&data, &detections, &extension))
                .await
                .map_err(|e| AnnotateError::Aborted(e.to_string()))??
        };

        let output = self
            .store
            .persist_annotated_image(id, extension, Bytes::from(rendered))
            .await
            .map_err(FileError::ResultPersist)?;

        info!(
            artifact_id = %id,
            detections = analysis.detections.len(),
            diseased_percent = analysis.diseased_percent,
            "Image processed"
        );
        self.metrics.image_processed();

        Ok(FileResult::Image(ImageResult {
            input: input.display().to_string(),
            output: output.display().to_string(),
            detections: analysis.detections,
            diseased_percent: analysis.diseased_percent,
        }))
    }

    async fn process_video(&self, id: &ArtifactId, input: PathBuf) -> Result<FileResult, FileError> {
        let destination = VideoDestination {
            project: self.store.results_root().to_path_buf(),
            name: id.to_string(),
        };

        let detector = self.detector.clone();
        let options = self.options;
        let source = input.clone();
        let annotated = self
            .infer(async move { detector.annotate_video(&source, &options, &destination).await })
            .await?;

        info!(artifact_id = %id, annotated = %annotated.display(), "Video processed");
        self.metrics.video_processed();

        Ok(FileResult::Video(VideoResult {
            input: input.display().to_string(),
            annotated_video: annotated.display().to_string(),
        }))
    }

    /// Run a detector call under an inference permit, waiting at most the timeout
    ///
    /// The call runs on its own task and releases its permit only once the
    /// detector answers, so a call abandoned at the deadline keeps its slot.
    async fn infer<T, F>(&self, call: F) -> Result<T, FileError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, DetectorError>> + Send + 'static,
    {
        let permits = self.permits.clone();
        let attempt = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| FileError::InferenceUnavailable)?;

            let task = tokio::spawn(async move {
                let result = call.await;
                drop(permit);
                result
            });

            task.await
                .map_err(|e| FileError::InferenceAborted(e.to_string()))?
                .map_err(FileError::from)
        };

        match tokio::time::timeout(self.inference_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(FileError::InferenceTimeout(self.inference_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{ImageInference, RawDetection};
    use crate::humanize::HumanDuration;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Returns canned boxes and writes a placeholder video where asked
    #[derive(Default)]
    struct FakeDetector {
        detections: Vec<RawDetection>,
        fail: bool,
        delay: Option<Duration>,
        seen: Mutex<Vec<PathBuf>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Detector for FakeDetector {
        async fn detect_image(
            &self,
            source: &Path,
            _options: &InferenceOptions,
        ) -> Result<ImageInference, DetectorError> {
            self.seen.lock().unwrap().push(source.to_path_buf());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(DetectorError::Status {
                    status: 500,
                    message: "model crashed".to_string(),
                });
            }
            Ok(ImageInference {
                labels: BTreeMap::from([(0, "diseased".to_string()), (1, "healthy".to_string())]),
                detections: self.detections.clone(),
            })
        }

        async fn annotate_video(
            &self,
            source: &Path,
            _options: &InferenceOptions,
            destination: &VideoDestination,
        ) -> Result<PathBuf, DetectorError> {
            self.seen.lock().unwrap().push(source.to_path_buf());
            let path = destination.conventional_path();
            // best effort: some tests break the results root on purpose
            if std::fs::create_dir_all(path.parent().unwrap()).is_ok() {
                std::fs::write(&path, b"annotated-video").unwrap();
            }
            Ok(path)
        }
    }

    fn png_bytes() -> Bytes {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(20, 20))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        Bytes::from(buf)
    }

    fn processor(dir: &TempDir, detector: FakeDetector, timeout: Duration) -> (BatchProcessor, Arc<Metrics>) {
        let store = Arc::new(
            ArtifactStore::open(dir.path().join("uploads"), dir.path().join("results")).unwrap(),
        );
        let config = DetectorConfig {
            inference_timeout: HumanDuration(timeout),
            ..DetectorConfig::default()
        };
        let metrics = Arc::new(Metrics::new());
        (
            BatchProcessor::new(store, Arc::new(detector), &config, metrics.clone()),
            metrics,
        )
    }

    fn diseased_and_healthy() -> Vec<RawDetection> {
        vec![
            RawDetection {
                class_index: 0,
                confidence: 0.9123,
                bbox: [0.0, 0.0, 10.0, 10.0],
            },
            RawDetection {
                class_index: 1,
                confidence: 0.5,
                bbox: [0.0, 0.0, 10.0, 5.0],
            },
        ]
    }

    #[tokio::test]
    async fn test_image_result() {
        let dir = TempDir::new().unwrap();
        let detector = FakeDetector {
            detections: diseased_and_healthy(),
            ..FakeDetector::default()
        };
        let (processor, _) = processor(&dir, detector, Duration::from_secs(5));

        let result = processor
            .process_file(&UploadFile::new("Leaf.PNG", png_bytes()))
            .await
            .unwrap();

        let FileResult::Image(image) = result else {
            panic!("expected image result");
        };
        assert_eq!(image.diseased_percent, 66.67);
        assert_eq!(image.detections.len(), 2);
        assert_eq!(image.detections[0].confidence, 0.912);
        assert!(image.input.ends_with(".png"));
        assert!(image.output.ends_with("_out.png"));
        assert!(Path::new(&image.output).is_file());
    }

    #[tokio::test]
    async fn test_video_result_uses_detector_path() {
        let dir = TempDir::new().unwrap();
        let (processor, metrics) = processor(&dir, FakeDetector::default(), Duration::from_secs(5));

        let result = processor
            .process_file(&UploadFile::new("field.MOV", Bytes::from_static(b"mov")))
            .await
            .unwrap();

        let FileResult::Video(video) = result else {
            panic!("expected video result");
        };
        let id = Path::new(&video.input).file_stem().unwrap().to_str().unwrap().to_string();
        let expected = dir.path().join("results").join(&id).join(format!("{id}.mp4"));
        assert_eq!(PathBuf::from(&video.annotated_video), expected);
        assert!(video.input.ends_with(".mov"));
        assert_eq!(metrics.snapshot().videos_processed, 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_skips_unsupported() {
        let dir = TempDir::new().unwrap();
        let (processor, metrics) = processor(&dir, FakeDetector::default(), Duration::from_secs(5));

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("a.png", png_bytes()),
                UploadFile::new("notes.txt", Bytes::from_static(b"hello")),
                UploadFile::new("b.mp4", Bytes::from_static(b"mp4")),
                UploadFile::new("c.jpg", png_bytes()),
            ])
            .await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert!(matches!(outcome.results[0], FileResult::Image(_)));
        assert!(matches!(outcome.results[1], FileResult::Video(_)));
        assert!(matches!(outcome.results[2], FileResult::Image(_)));

        // unsupported files are never written
        let uploads: Vec<_> = std::fs::read_dir(dir.path().join("uploads")).unwrap().collect();
        assert_eq!(uploads.len(), 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.images_processed, 2);
        assert_eq!(snapshot.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_inference_failure_is_isolated_and_upload_kept() {
        let dir = TempDir::new().unwrap();
        let detector = FakeDetector {
            fail: true,
            ..FakeDetector::default()
        };
        let (processor, metrics) = processor(&dir, detector, Duration::from_secs(5));

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("a.png", png_bytes()),
                UploadFile::new("b.mkv", Bytes::from_static(b"mkv")),
            ])
            .await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results.len(), 1);
        assert!(matches!(outcome.results[0], FileResult::Video(_)));

        let uploads: Vec<_> = std::fs::read_dir(dir.path().join("uploads")).unwrap().collect();
        assert_eq!(uploads.len(), 2);
        assert_eq!(metrics.snapshot().files_failed, 1);
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_only_that_file() {
        let dir = TempDir::new().unwrap();
        let (processor, _) = processor(&dir, FakeDetector::default(), Duration::from_secs(5));

        let err = processor
            .process_file(&UploadFile::new("broken.jpg", Bytes::from_static(b"not a jpeg")))
            .await
            .unwrap_err();

        assert!(matches!(err, FileError::Annotation(_)));
    }

    #[tokio::test]
    async fn test_inference_timeout() {
        let dir = TempDir::new().unwrap();
        let detector = FakeDetector {
            delay: Some(Duration::from_secs(5)),
            ..FakeDetector::default()
        };
        let (processor, metrics) = processor(&dir, detector, Duration::from_millis(50));

        let outcome = processor
            .handle_batch(vec![UploadFile::new("slow.png", png_bytes())])
            .await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failed, 1);
        assert_eq!(metrics.snapshot().inference_timeouts, 1);
    }

    #[tokio::test]
    async fn test_identical_files_get_distinct_artifacts() {
        let dir = TempDir::new().unwrap();
        let (processor, _) = processor(&dir, FakeDetector::default(), Duration::from_secs(5));
        let data = png_bytes();

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("same.png", data.clone()),
                UploadFile::new("same.png", data),
            ])
            .await;

        let outputs: Vec<String> = outcome
            .results
            .iter()
            .map(|r| match r {
                FileResult::Image(image) => image.output.clone(),
                FileResult::Video(video) => video.annotated_video.clone(),
            })
            .collect();
        assert_eq!(outputs.len(), 2);
        assert_ne!(outputs[0], outputs[1]);
    }

    #[tokio::test]
    async fn test_detector_reads_persisted_upload() {
        let dir = TempDir::new().unwrap();
        let detector = Arc::new(FakeDetector::default());
        let store = Arc::new(
            ArtifactStore::open(dir.path().join("uploads"), dir.path().join("results")).unwrap(),
        );
        let processor = BatchProcessor::new(
            store,
            detector.clone(),
            &DetectorConfig::default(),
            Arc::new(Metrics::new()),
        );

        processor
            .process_file(&UploadFile::new("leaf.jpeg", png_bytes()))
            .await
            .unwrap();

        let seen = detector.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(std::fs::read(&seen[0]).unwrap(), png_bytes().to_vec());
    }

    fn open_store(dir: &TempDir) -> Arc<ArtifactStore> {
        Arc::new(ArtifactStore::open(dir.path().join("uploads"), dir.path().join("results")).unwrap())
    }

    /// Swap a storage root for a plain file so every write under it fails
    fn break_root(root: &Path) {
        std::fs::remove_dir_all(root).unwrap();
        std::fs::write(root, b"not a directory").unwrap();
    }

    #[tokio::test]
    async fn test_timed_out_call_keeps_model_slot() {
        let dir = TempDir::new().unwrap();
        let detector = Arc::new(FakeDetector {
            delay: Some(Duration::from_millis(400)),
            ..FakeDetector::default()
        });
        let config = DetectorConfig {
            inference_timeout: HumanDuration(Duration::from_millis(50)),
            max_concurrent_inferences: 1,
            ..DetectorConfig::default()
        };
        let metrics = Arc::new(Metrics::new());
        let processor = BatchProcessor::new(open_store(&dir), detector.clone(), &config, metrics.clone());

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("a.png", png_bytes()),
                UploadFile::new("b.png", png_bytes()),
                UploadFile::new("c.png", png_bytes()),
            ])
            .await;
        assert_eq!(outcome.failed, 3);
        assert_eq!(metrics.snapshot().inference_timeouts, 3);

        // let the abandoned call finish
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(detector.seen.lock().unwrap().len(), 1);
        assert_eq!(detector.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slot_is_released_when_abandoned_call_finishes() {
        let dir = TempDir::new().unwrap();
        let detector = Arc::new(FakeDetector {
            delay: Some(Duration::from_millis(100)),
            ..FakeDetector::default()
        });
        let config = DetectorConfig {
            inference_timeout: HumanDuration(Duration::from_millis(50)),
            ..DetectorConfig::default()
        };
        let processor =
            BatchProcessor::new(open_store(&dir), detector.clone(), &config, Arc::new(Metrics::new()));

        let first = processor.handle_batch(vec![UploadFile::new("a.png", png_bytes())]).await;
        assert_eq!(first.failed, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;

        // the next call gets the slot and is itself bounded by the timeout
        let second = processor.handle_batch(vec![UploadFile::new("b.png", png_bytes())]).await;
        assert_eq!(second.failed, 1);
        assert_eq!(detector.seen.lock().unwrap().len(), 2);
        assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upload_persist_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let detector = Arc::new(FakeDetector::default());
        let metrics = Arc::new(Metrics::new());
        let processor =
            BatchProcessor::new(open_store(&dir), detector.clone(), &DetectorConfig::default(), metrics.clone());

        let uploads = dir.path().join("uploads");
        break_root(&uploads);

        let err = processor
            .process_file(&UploadFile::new("a.png", png_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::UploadPersist(_)));
        assert_eq!(err.code(), "UPLOAD_PERSIST_FAILURE");

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("a.png", png_bytes()),
                UploadFile::new("notes.txt", Bytes::from_static(b"hello")),
            ])
            .await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.results.is_empty());
        assert!(detector.seen.lock().unwrap().is_empty());

        // once the root is back the same processor serves files again
        std::fs::remove_file(&uploads).unwrap();
        std::fs::create_dir_all(&uploads).unwrap();
        let outcome = processor
            .handle_batch(vec![UploadFile::new("b.png", png_bytes())])
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(metrics.snapshot().files_failed, 1);
    }

    #[tokio::test]
    async fn test_result_persist_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let (processor, metrics) = processor(&dir, FakeDetector::default(), Duration::from_secs(5));
        break_root(&dir.path().join("results"));

        let outcome = processor
            .handle_batch(vec![
                UploadFile::new("a.png", png_bytes()),
                UploadFile::new("b.mp4", Bytes::from_static(b"mp4")),
            ])
            .await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results.len(), 1);
        assert!(matches!(outcome.results[0], FileResult::Video(_)));
        assert_eq!(metrics.snapshot().files_failed, 1);

        let err = processor
            .process_file(&UploadFile::new("c.jpg", png_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ResultPersist(_)));
    }
}
