use image::DynamicImage;
use image::imageops::FilterType;
use ndarray::Array4;

use crate::inference::config::{ClassifierConfig, ClassifierConfigError, TensorLayout};

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Config(#[from] ClassifierConfigError),
}

/// Resize and scaling parameters for the classifier input tensor.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    filter: FilterType,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32, filter: FilterType, layout: TensorLayout) -> Self {
        Self {
            width,
            height,
            filter,
            layout,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, PreprocessError> {
        Ok(Self::new(
            config.width(),
            config.height(),
            config.filter_type()?,
            config.input.layout,
        ))
    }

    pub fn load_and_preprocess(&self, path: &std::path::Path) -> Result<Array4<f32>, PreprocessError> {
        let image = image::open(path)?;
        Ok(self.preprocess(&image))
    }

    /// Produces a batch of one RGB image scaled to `[0.0, 1.0]`.
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = image
            .resize_exact(self.width, self.height, self.filter)
            .to_rgb8();
        let (w, h) = (self.width as usize, self.height as usize);

        let mut tensor = match self.layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        };
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for (c, &value) in pixel.0.iter().enumerate() {
                let scaled = value as f32 / 255.0;
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = scaled,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = scaled,
                }
            }
        }
        tensor
    }
}
