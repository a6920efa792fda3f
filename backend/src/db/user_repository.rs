use chrono::Utc;
use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::{NewUser, User};

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, user_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.user_type)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, &format!("user with email {}", user.email)))?;

        log::info!("Created user {} ({})", user.email, user.user_type);
        Ok(User {
            id: result.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            user_type: user.user_type.clone(),
            created_at,
        })
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, user_type, created_at
            FROM users WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[cfg(test)]
    pub async fn count_by_email(&self, email: &str) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "Dana".into(),
            email: email.into(),
            password_hash: "pbkdf2-sha256$1$00$00".into(),
            user_type: "radiologist".into(),
        }
    }

    #[actix_web::test]
    async fn creates_and_finds_user() {
        let repo = UserRepository::new(memory_pool().await);
        let created = repo.create_user(&new_user("dana@example.com")).await.unwrap();

        let found = repo.get_user_by_email("dana@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.username, "Dana");
        assert_eq!(found.user_type, "radiologist");
        assert!(repo.get_user_by_email("other@example.com").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn duplicate_email_is_rejected() {
        let repo = UserRepository::new(memory_pool().await);
        repo.create_user(&new_user("dana@example.com")).await.unwrap();
        let err = repo.create_user(&new_user("dana@example.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(_)));
        assert_eq!(repo.count_by_email("dana@example.com").await.unwrap(), 1);
    }
}
