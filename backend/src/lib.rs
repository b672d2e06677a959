pub mod config;
pub mod model;
pub mod policy;
pub mod prediction;
pub mod preprocess;
pub mod routes;
pub mod storage;
pub mod views;

use std::sync::Arc;

use config::AppConfig;
use model::{Classifier, ModelError};
use prediction::PredictionService;
use storage::upload_store::UploadStore;
use views::{Catalog, CatalogError, Renderer};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Model loading failed: {0}")]
    Model(#[from] ModelError),
    #[error("Message catalog failed: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Failed to prepare uploads directory {path}: {source}")]
    UploadsDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Everything the HTTP layer needs, built once before the server binds.
pub struct Services {
    pub prediction: PredictionService,
    pub renderer: Renderer,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let classifier = model::load_classifier(&config.model)?;
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(
        config: &AppConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, StartupError> {
        let uploads_dir = config.uploads_dir();
        std::fs::create_dir_all(&uploads_dir).map_err(|source| StartupError::UploadsDir {
            path: uploads_dir.clone(),
            source,
        })?;

        let store = UploadStore::new(uploads_dir, config.max_upload_bytes)
            .with_public_path(format!("/static/{}", config.uploads_subdir));
        let prediction =
            PredictionService::new(classifier, store, config.preprocess.clone());
        let renderer = Renderer::new(Catalog::embedded()?, config.default_language);

        Ok(Self {
            prediction,
            renderer,
        })
    }
}
