use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::preprocess::PreprocessedTensor;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to load model {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("No inference backend compiled in; rebuild with the `torch` feature")]
    BackendUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Tensor is not contiguous")]
    NonContiguousInput,
    #[error("Model produced no output")]
    EmptyOutput,
    #[error("Model output {0} is not a probability")]
    ScoreOutOfRange(f32),
    #[error("Model error: {0}")]
    Backend(String),
    #[error("Model lock poisoned")]
    Poisoned,
}

/// Probability that the image shows ergot, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PredictionScore(f32);

impl PredictionScore {
    pub fn new(value: f32) -> Result<Self, InferenceError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InferenceError::ScoreOutOfRange(value))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

/// A loaded binary image classifier. Implementations must tolerate concurrent calls.
pub trait Classifier: Send + Sync {
    fn infer(&self, tensor: &PreprocessedTensor) -> Result<PredictionScore, InferenceError>;
}

pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ModelError> {
    if !config.path.is_file() {
        return Err(ModelError::NotFound(config.path.clone()));
    }
    log::info!("Loading model from {}", config.path.display());
    load_backend(&config.path)
}

#[cfg(feature = "torch")]
fn load_backend(path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
    Ok(Arc::new(torch::TorchClassifier::new(path)?))
}

#[cfg(not(feature = "torch"))]
fn load_backend(path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
    log::error!(
        "Model {} found but this build has no inference backend",
        path.display()
    );
    Err(ModelError::BackendUnavailable)
}

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;

    use tch::{CModule, Device, Kind, Tensor};

    use super::{Classifier, InferenceError, ModelError, PredictionScore};
    use crate::preprocess::PreprocessedTensor;

    pub struct TorchClassifier {
        model: Mutex<CModule>,
        device: Device,
    }

    impl TorchClassifier {
        pub fn new(path: &Path) -> Result<Self, ModelError> {
            let device = Device::cuda_if_available();
            let mut model =
                CModule::load_on_device(path, device).map_err(|e| ModelError::Load {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            model.set_eval();
            log::info!("Model loaded on {:?}", device);
            Ok(Self {
                model: Mutex::new(model),
                device,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn infer(&self, tensor: &PreprocessedTensor) -> Result<PredictionScore, InferenceError> {
            let data = tensor
                .as_slice()
                .ok_or(InferenceError::NonContiguousInput)?;
            let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
            let input = Tensor::from_slice(data).view(shape.as_slice()).to_device(self.device);

            let output = {
                let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
                tch::no_grad(|| model.forward_ts(&[input]))
                    .map_err(|e| InferenceError::Backend(e.to_string()))?
            };

            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            if num_elements == 0 {
                return Err(InferenceError::EmptyOutput);
            }
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            PredictionScore::new(output_vec[0])
        }
    }
}
