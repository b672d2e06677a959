//! Image loading and normalization into the classifier's input layout.

use image::imageops::FilterType;
use image::ImageReader;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::PreprocessConfig;

pub const INPUT_WIDTH: u32 = 224;
pub const INPUT_HEIGHT: u32 = 224;
pub const INPUT_CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum InvalidImageError {
    #[error("Failed to read image {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Order of the colour channels in the innermost tensor axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV's native order; the ergot model was trained on `cv2.imread` output.
    #[default]
    Bgr,
}

/// NHWC `f32` batch of one image, values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    data: Array4<f32>,
}

impl PreprocessedTensor {
    pub fn shape(&self) -> [usize; 4] {
        let dims = self.data.shape();
        [dims[0], dims[1], dims[2], dims[3]]
    }

    #[cfg(test)]
    fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Contiguous row-major view, as runtimes expect it.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }
}

pub fn preprocess_image(
    path: &Path,
    config: &PreprocessConfig,
) -> Result<PreprocessedTensor, InvalidImageError> {
    let img = ImageReader::open(path)
        .map_err(|source| InvalidImageError::Read {
            path: path.display().to_string(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| InvalidImageError::Read {
            path: path.display().to_string(),
            source,
        })?
        .decode()?;

    // Aspect ratio is not preserved.
    let resized = img
        .resize_exact(INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let mut data = Array4::<f32>::zeros((
        1,
        INPUT_HEIGHT as usize,
        INPUT_WIDTH as usize,
        INPUT_CHANNELS,
    ));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match config.channel_order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (c, value) in ordered.into_iter().enumerate() {
            data[[0, y as usize, x as usize, c]] = value as f32 / 255.0;
        }
    }

    Ok(PreprocessedTensor { data })
}
