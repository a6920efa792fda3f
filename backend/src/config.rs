use std::path::PathBuf;

use crate::auth::password::DEFAULT_ITERATIONS;
use crate::imaging::dicom::DEFAULT_MAX_PIXELS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub model_path: PathBuf,
    pub classifier_config_path: PathBuf,
    pub session_ttl_hours: i64,
    pub max_upload_bytes: usize,
    pub max_dicom_pixels: u64,
    pub password_iterations: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = match lookup("BIRADS_BIND_ADDR") {
            Some(addr) => addr,
            None => {
                let port = lookup("PORT").unwrap_or_else(|| "8081".to_string());
                format!("0.0.0.0:{}", port)
            }
        };

        Ok(Self {
            bind_address,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://feedback.db?mode=rwc".to_string()),
            upload_dir: lookup("UPLOAD_DIR")
                .unwrap_or_else(|| "static/uploads".to_string())
                .into(),
            model_path: lookup("MODEL_PATH")
                .unwrap_or_else(|| "model.pt".to_string())
                .into(),
            classifier_config_path: lookup("CLASSIFIER_CONFIG")
                .unwrap_or_else(|| "config/classifier.yaml".to_string())
                .into(),
            session_ttl_hours: parse_or(&lookup, "SESSION_TTL_HOURS", 24)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            max_dicom_pixels: parse_or(&lookup, "MAX_DICOM_PIXELS", DEFAULT_MAX_PIXELS)?,
            password_iterations: parse_or(&lookup, "PASSWORD_ITERATIONS", DEFAULT_ITERATIONS)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
