use std::path::Path;
use std::sync::Arc;

use super::classifier::{Classifier, InferenceError, Prediction};
use super::config::ClassifierConfig;
use crate::imaging::preprocess::{PreprocessError, Preprocessor};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyImageError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Preprocessor plus the shared classifier handle.
#[derive(Clone)]
pub struct InferenceService {
    classifier: Arc<dyn Classifier>,
    preprocessor: Preprocessor,
}

impl InferenceService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        config: &ClassifierConfig,
    ) -> Result<Self, PreprocessError> {
        Ok(Self {
            classifier,
            preprocessor: Preprocessor::from_config(config)?,
        })
    }

    /// Decodes a raster image from disk and classifies it. Blocking.
    pub fn classify_image(&self, path: &Path) -> Result<Prediction, ClassifyImageError> {
        let tensor = self.preprocessor.load_and_preprocess(path)?;
        let probabilities = self.classifier.predict(&tensor)?;
        let prediction = Prediction::from_probabilities(probabilities)?;
        log::info!(
            "Classified {} as {} ({:.3})",
            path.display(),
            prediction.class,
            prediction.confidence()
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::classifier::testing::StubClassifier;
    use birads_shared::BiradsClass;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::Ordering;

    #[test]
    fn classifies_a_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::from_pixel(300, 200, Rgb([12, 200, 90])).save(&path).unwrap();

        let stub = Arc::new(StubClassifier::peaked_at(3));
        let service = InferenceService::new(stub.clone(), &ClassifierConfig::default()).unwrap();
        let prediction = service.classify_image(&path).unwrap();

        assert_eq!(prediction.class, BiradsClass::Birads4);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wrong_output_length_is_an_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::new(10, 10).save(&path).unwrap();

        let service = InferenceService::new(
            Arc::new(StubClassifier::new(vec![1.0, 0.0])),
            &ClassifierConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            service.classify_image(&path),
            Err(ClassifyImageError::Inference(InferenceError::OutputLength(2)))
        ));
    }
}
