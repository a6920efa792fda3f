use std::path::Path;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ClassifierConfigError {
    #[error("failed to read classifier config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid classifier config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid classifier config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub version: f32,
    pub input: InputConfig,
    pub preprocessing: PreprocessingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// `[width, height]` fed to the model.
    pub size: Vec<u32>,
    pub channels: u32,
    pub layout: TensorLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub resize_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Apply softmax to raw model outputs. Off when the exported model already ends in softmax.
    pub softmax: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            version: 1.0,
            input: InputConfig {
                size: vec![150, 150],
                channels: 3,
                layout: TensorLayout::Nhwc,
            },
            preprocessing: PreprocessingConfig {
                resize_method: "nearest".to_string(),
            },
            output: OutputConfig { softmax: false },
        }
    }
}

impl ClassifierConfig {
    pub fn load(path: &Path) -> Result<Self, ClassifierConfigError> {
        let config_str =
            std::fs::read_to_string(path).map_err(|source| ClassifierConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml(&config_str)
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ClassifierConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::warn!(
                "Classifier config {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ClassifierConfigError> {
        let config: ClassifierConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ClassifierConfigError> {
        match self.input.size.as_slice() {
            [w, h] if *w > 0 && *h > 0 => {}
            other => {
                return Err(ClassifierConfigError::Invalid(format!(
                    "input.size must be [width, height], got {:?}",
                    other
                )));
            }
        }
        if self.input.channels != 3 {
            return Err(ClassifierConfigError::Invalid(format!(
                "input.channels must be 3, got {}",
                self.input.channels
            )));
        }
        self.filter_type()?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.input.size.first().copied().unwrap_or(150)
    }

    pub fn height(&self) -> u32 {
        self.input.size.get(1).copied().unwrap_or(150)
    }

    pub fn filter_type(&self) -> Result<FilterType, ClassifierConfigError> {
        match self.preprocessing.resize_method.to_ascii_lowercase().as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "bilinear" | "triangle" => Ok(FilterType::Triangle),
            "bicubic" | "catmullrom" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos" | "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(ClassifierConfigError::Invalid(format!(
                "unknown resize_method '{}'",
                other
            ))),
        }
    }
}
