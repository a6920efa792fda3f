use chrono::Utc;
use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::{FeedbackRecord, NewFeedback};

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: SqlitePool,
}

impl FeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_feedback(
        &self,
        feedback: &NewFeedback,
    ) -> Result<FeedbackRecord, RepositoryError> {
        let created_at = Utc::now();
        let prediction = feedback.prediction().to_string();
        let verdict = feedback.verdict().to_string();
        let correct_class = feedback.correct_class().map(|c| c.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO feedback (file_path, prediction, feedback, correct_class, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(feedback.file_path())
        .bind(&prediction)
        .bind(&verdict)
        .bind(&correct_class)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(FeedbackRecord {
            id: result.last_insert_rowid(),
            file_path: feedback.file_path().to_string(),
            prediction,
            feedback: verdict,
            correct_class,
            created_at,
        })
    }

    pub async fn get_feedback_by_file_path(
        &self,
        file_path: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, FeedbackRecord>(
            r#"
            SELECT id, file_path, prediction, feedback, correct_class, created_at
            FROM feedback WHERE file_path = ?
            ORDER BY id
            "#,
        )
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn get_recent_feedback(
        &self,
        limit: i64,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, FeedbackRecord>(
            r#"
            SELECT id, file_path, prediction, feedback, correct_class, created_at
            FROM feedback
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
