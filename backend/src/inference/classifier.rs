use birads_shared::{BiradsClass, ClassProbability, ClassificationResponse};
use ndarray::Array4;
use strum::EnumCount;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model error: {0}")]
    Model(String),
    #[error("classifier returned {0} outputs, expected {expected}", expected = BiradsClass::COUNT)]
    OutputLength(usize),
    #[error("classifier returned a non-finite output")]
    NonFinite,
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// An opaque image classifier: preprocessed tensor in, one score per BIRADS class out.
///
/// Implementations are shared across worker threads and must not mutate
/// observable state between calls.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: BiradsClass,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Picks the highest score; ties resolve to the lowest index.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, InferenceError> {
        if probabilities.len() != BiradsClass::COUNT {
            return Err(InferenceError::OutputLength(probabilities.len()));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite);
        }

        let mut best = 0;
        for (index, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[best] {
                best = index;
            }
        }
        let class = BiradsClass::from_index(best).ok_or(InferenceError::OutputLength(best))?;
        Ok(Self {
            class,
            probabilities,
        })
    }

    pub fn confidence(&self) -> f32 {
        self.probabilities[self.class.index()]
    }

    pub fn to_response(&self, image_path: String) -> ClassificationResponse {
        let probabilities = BiradsClass::labels()
            .into_iter()
            .zip(self.probabilities.iter())
            .map(|(label, &probability)| ClassProbability { label, probability })
            .collect();
        ClassificationResponse {
            prediction: self.class,
            confidence: self.confidence(),
            probabilities,
            image_path,
        }
    }
}
