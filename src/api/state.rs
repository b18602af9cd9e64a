use std::sync::Arc;

use crate::config::Config;
use crate::detector::Detector;
use crate::observability::Metrics;
use crate::pipeline::BatchProcessor;
use crate::storage::ArtifactStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ArtifactStore>,
    pub detector: Arc<dyn Detector>,
    pub processor: Arc<BatchProcessor>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, store: ArtifactStore, detector: Arc<dyn Detector>) -> Self {
        let store = Arc::new(store);
        let metrics = Arc::new(Metrics::new());
        let processor = BatchProcessor::new(
            store.clone(),
            detector.clone(),
            &config.detector,
            metrics.clone(),
        );

        Self {
            config: Arc::new(config),
            store,
            detector,
            processor: Arc::new(processor),
            metrics,
        }
    }
}
