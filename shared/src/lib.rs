use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// BIRADS assessment categories, in the order the classifier emits them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    EnumCount, AsRefStr,
)]
pub enum BiradsClass {
    #[strum(serialize = "BIRADS 1")]
    #[serde(rename = "BIRADS 1")]
    Birads1,
    #[strum(serialize = "BIRADS 2")]
    #[serde(rename = "BIRADS 2")]
    Birads2,
    #[strum(serialize = "BIRADS 3")]
    #[serde(rename = "BIRADS 3")]
    Birads3,
    #[strum(serialize = "BIRADS 4")]
    #[serde(rename = "BIRADS 4")]
    Birads4,
    #[strum(serialize = "BIRADS 5")]
    #[serde(rename = "BIRADS 5")]
    Birads5,
}

impl BiradsClass {
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn labels() -> Vec<String> {
        Self::iter().map(|class| class.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackVerdict {
    Agree,
    Disagree,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClassificationResponse {
    pub prediction: BiradsClass,
    pub confidence: f32,
    pub probabilities: Vec<ClassProbability>,
    /// Public path of the classified image, e.g. `uploads/scan.png`.
    pub image_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FeedbackRecordView {
    pub id: i64,
    pub file_path: String,
    pub prediction: String,
    pub feedback: FeedbackVerdict,
    pub correct_class: Option<String>,
    pub created_at: String,
}
