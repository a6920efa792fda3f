pub mod classifier;
pub mod config;
pub mod service;
#[cfg(feature = "torch")]
pub mod torch;

use std::path::Path;
use std::sync::Arc;

use classifier::{Classifier, InferenceError};
use config::ClassifierConfig;

/// Loads the classifier once at startup; the handle is shared read-only by all workers.
#[cfg(feature = "torch")]
pub fn load_classifier(
    model_path: &Path,
    config: &ClassifierConfig,
) -> Result<Arc<dyn Classifier>, InferenceError> {
    let model = torch::TorchClassifier::load(model_path, config.output.softmax)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
pub fn load_classifier(
    model_path: &Path,
    _config: &ClassifierConfig,
) -> Result<Arc<dyn Classifier>, InferenceError> {
    Err(InferenceError::Unavailable(format!(
        "cannot load {}: built without the `torch` feature",
        model_path.display()
    )))
}
