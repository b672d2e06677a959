use ergot_shared::ClassificationResult;
use std::sync::Arc;

use crate::config::PreprocessConfig;
use crate::model::{Classifier, InferenceError};
use crate::policy::decide;
use crate::preprocess::{InvalidImageError, preprocess_image};
use crate::storage::upload_store::{StorageError, UploadStore};

/// The `file` part of a `/predict` request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedImage {
    /// Browsers submit an empty, unnamed part when no file was chosen.
    pub fn is_blank(&self) -> bool {
        self.filename.is_empty() && self.data.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("No file uploaded")]
    NoFile,
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] InvalidImageError),
    #[error("File too large: {size} bytes exceeds {max}")]
    UploadTooLarge { size: usize, max: usize },
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Prediction task failed: {0}")]
    Blocking(String),
}

impl From<StorageError> for PredictionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileTooLarge { size, max } => PredictionError::UploadTooLarge { size, max },
            StorageError::InvalidFormat(name) => {
                PredictionError::InvalidImage(InvalidImageError::UnsupportedType(name))
            }
            other => PredictionError::Storage(other),
        }
    }
}

/// Save, preprocess, infer and decide for one upload.
#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<dyn Classifier>,
    store: UploadStore,
    preprocess: PreprocessConfig,
}

impl PredictionService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: UploadStore,
        preprocess: PreprocessConfig,
    ) -> Self {
        Self {
            classifier,
            store,
            preprocess,
        }
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn handle_upload(
        &self,
        upload: UploadedImage,
    ) -> Result<ClassificationResult, PredictionError> {
        if upload.is_blank() {
            return Err(PredictionError::NoFile);
        }
        check_content_type(upload.content_type.as_deref())?;

        let staged = self.store.stage(&upload.filename, &upload.data)?;
        let tensor = match preprocess_image(staged.staging_path(), &self.preprocess) {
            Ok(tensor) => tensor,
            Err(e) => {
                log::warn!("Rejected upload {}: {}", staged.filename(), e);
                return Err(e.into());
            }
        };
        let stored = self.store.commit(staged)?;
        log::info!(
            "Saved upload {} ({} bytes)",
            stored.filename,
            upload.data.len()
        );

        let score = self.classifier.infer(&tensor)?;
        let decision = decide(score);
        log::info!(
            "Classified {} as {} (score {:.4}, confidence {:.2}%)",
            stored.filename,
            decision.label,
            score.value(),
            decision.confidence_percent
        );

        Ok(ClassificationResult {
            label: decision.label,
            confidence_percent: decision.confidence_percent,
            filename: stored.filename,
        })
    }
}

fn check_content_type(content_type: Option<&str>) -> Result<(), PredictionError> {
    match content_type {
        None => Ok(()),
        Some(ct) if ct.starts_with("image/") || ct == "application/octet-stream" => Ok(()),
        Some(ct) => Err(PredictionError::InvalidImage(
            InvalidImageError::UnsupportedType(ct.to_string()),
        )),
    }
}
