use std::sync::Arc;

use actix_web::web;
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::models::{IssuedSession, SessionUser, SignUpForm};
use super::password::PasswordHasher;
use crate::db::RepositoryError;
use crate::db::models::{NewUser, SessionRecord, User};
use crate::db::session_repository::SessionRepository;
use crate::db::user_repository::UserRepository;

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already exists. Please use a different email.")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl AuthError {
    /// Errors the user can fix by resubmitting the form.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AuthError::EmailTaken | AuthError::InvalidCredentials | AuthError::Validation(_)
        )
    }
}

/// Sign-up, sign-in and server-side sessions.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    sessions: SessionRepository,
    hasher: PasswordHasher,
    session_ttl: Duration,
    /// Verified against when the email is unknown, so both failures cost one PBKDF2 run.
    dummy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(
        users: UserRepository,
        sessions: SessionRepository,
        hasher: PasswordHasher,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            session_ttl,
            dummy_hash: hasher.hash(&generate_token()).into(),
        }
    }

    pub async fn register(&self, form: SignUpForm) -> Result<User, AuthError> {
        let registration = validate_sign_up(form)?;

        if self
            .users
            .get_user_by_email(&registration.email)
            .await?
            .is_some()
        {
            log::info!("Sign-up rejected, email exists: {}", registration.email);
            return Err(AuthError::EmailTaken);
        }

        let hasher = self.hasher;
        let password = registration.password;
        let password_hash = web::block(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        let new_user = NewUser {
            username: registration.username,
            email: registration.email,
            password_hash,
            user_type: registration.user_type,
        };
        match self.users.create_user(&new_user).await {
            Ok(user) => Ok(user),
            Err(RepositoryError::Duplicate(_)) => Err(AuthError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let email = normalize_email(email);
        let user = self.users.get_user_by_email(&email).await?;

        let hasher = self.hasher;
        let password = password.to_string();
        let stored = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let verified = web::block(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        let user = match user {
            Some(user) if verified => user,
            Some(_) => {
                log::info!("Sign-in failed for {}: wrong password", email);
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                log::info!("Sign-in failed for unknown email {}", email);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = generate_token();
        let now = Utc::now();
        let record = SessionRecord {
            token_hash: hash_token(&token),
            user_id: user.id,
            username: user.username.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        self.sessions.create_session(&record).await?;

        let purged = self.sessions.delete_expired(now).await?;
        if purged > 0 {
            log::debug!("Purged {} expired sessions", purged);
        }

        log::info!("User {} signed in", user.email);
        Ok(IssuedSession {
            token,
            user: SessionUser {
                user_id: user.id,
                username: user.username,
            },
            max_age_seconds: self.session_ttl.num_seconds(),
        })
    }

    /// Looks up the session behind a cookie token; expired sessions are removed and yield `None`.
    pub async fn resolve(&self, token: &str) -> Result<Option<SessionUser>, AuthError> {
        if token.is_empty() {
            return Ok(None);
        }
        let token_hash = hash_token(token);
        let Some(session) = self.sessions.get_session(&token_hash).await? else {
            return Ok(None);
        };
        if session.is_expired(Utc::now()) {
            log::debug!("Session for user {} expired", session.user_id);
            self.sessions.delete_session(&token_hash).await?;
            return Ok(None);
        }
        Ok(Some(SessionUser {
            user_id: session.user_id,
            username: session.username,
        }))
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        if self.sessions.delete_session(&hash_token(token)).await? {
            log::info!("Session closed");
        }
        Ok(())
    }
}

struct Registration {
    username: String,
    email: String,
    password: String,
    user_type: String,
}

fn validate_sign_up(form: SignUpForm) -> Result<Registration, AuthError> {
    let username = form.username.trim().to_string();
    let email = normalize_email(&form.email);
    let user_type = form.user_type.trim().to_string();

    if username.is_empty() || username.len() > 80 {
        return Err(AuthError::Validation(
            "Username must be between 1 and 80 characters.".into(),
        ));
    }
    if email.len() > 120 || !is_plausible_email(&email) {
        return Err(AuthError::Validation("Please enter a valid email.".into()));
    }
    if form.password.is_empty() {
        return Err(AuthError::Validation("Password must not be empty.".into()));
    }
    if user_type.is_empty() || user_type.len() > 20 {
        return Err(AuthError::Validation(
            "User type must be between 1 and 20 characters.".into(),
        ));
    }
    Ok(Registration {
        username,
        email,
        password: form.password,
        user_type,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
