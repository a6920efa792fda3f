use birads_shared::{BiradsClass, FeedbackRecordView, FeedbackVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub user_type: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedbackRecord {
    pub id: i64,
    pub file_path: String,
    pub prediction: String,
    pub feedback: String,
    pub correct_class: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn to_view(&self) -> Result<FeedbackRecordView, RepositoryError> {
        let feedback = FeedbackVerdict::from_str(&self.feedback).map_err(|_| {
            RepositoryError::InvalidData(format!(
                "feedback {} has verdict '{}'",
                self.id, self.feedback
            ))
        })?;
        Ok(FeedbackRecordView {
            id: self.id,
            file_path: self.file_path.clone(),
            prediction: self.prediction.clone(),
            feedback,
            correct_class: self.correct_class.clone(),
            created_at: self.created_at.to_rfc3339(),
        })
    }
}

/// A review of one classification. A corrected class is only kept for disagreements.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    file_path: String,
    prediction: BiradsClass,
    verdict: FeedbackVerdict,
    correct_class: Option<BiradsClass>,
}

impl NewFeedback {
    pub fn new(
        file_path: String,
        prediction: BiradsClass,
        verdict: FeedbackVerdict,
        correct_class: Option<BiradsClass>,
    ) -> Self {
        let correct_class = match verdict {
            FeedbackVerdict::Agree => None,
            FeedbackVerdict::Disagree => correct_class,
        };
        Self {
            file_path,
            prediction,
            verdict,
            correct_class,
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn prediction(&self) -> BiradsClass {
        self.prediction
    }

    pub fn verdict(&self) -> FeedbackVerdict {
        self.verdict
    }

    pub fn correct_class(&self) -> Option<BiradsClass> {
        self.correct_class
    }
}
