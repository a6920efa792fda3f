use serde::Deserialize;

/// The signed-in user attached to a request by the session middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub user_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

/// A freshly issued session; `token` goes to the client, only its hash is stored.
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub user: SessionUser,
    pub max_age_seconds: i64,
}
