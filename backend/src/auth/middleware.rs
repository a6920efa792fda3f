use super::models::SessionUser;
use super::service::AuthService;
use actix_web::http::header;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{Ready, ok, ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "session";

/// What an unauthenticated request gets back.
#[derive(Clone, Copy, Debug)]
pub enum OnMissingSession {
    /// Browser pages: 303 to the sign-in view.
    RedirectToSignIn,
    /// JSON endpoints: 401 with an error body.
    Unauthorized,
}

#[derive(Clone)]
pub struct SessionMiddleware {
    auth: Arc<AuthService>,
    on_missing: OnMissingSession,
}

impl SessionMiddleware {
    pub fn new(auth: AuthService, on_missing: OnMissingSession) -> Self {
        Self {
            auth: Arc::new(auth),
            on_missing,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = SessionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionMiddlewareService {
            service: Arc::new(service),
            auth: self.auth.clone(),
            on_missing: self.on_missing,
        })
    }
}

pub struct SessionMiddlewareService<S> {
    service: Arc<S>,
    auth: Arc<AuthService>,
    on_missing: OnMissingSession,
}

#[derive(Debug)]
enum SessionError {
    NoCookie,
    UnknownOrExpired,
    Lookup(String),
}

impl SessionError {
    fn log_message(&self, path: &str) -> String {
        match self {
            SessionError::NoCookie => format!("No session cookie for path: {}", path),
            SessionError::UnknownOrExpired => {
                format!("Unknown or expired session for path: {}", path)
            }
            SessionError::Lookup(e) => format!("Session lookup failed for path {}: {}", path, e),
        }
    }
}

impl OnMissingSession {
    fn response(&self) -> HttpResponse {
        match self {
            OnMissingSession::RedirectToSignIn => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/"))
                .finish(),
            OnMissingSession::Unauthorized => HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "Missing or invalid session"})),
        }
    }
}

async fn resolve_session(
    token: Option<String>,
    auth: &AuthService,
) -> Result<SessionUser, SessionError> {
    let token = token.ok_or(SessionError::NoCookie)?;
    auth.resolve(&token)
        .await
        .map_err(|e| SessionError::Lookup(e.to_string()))?
        .ok_or(SessionError::UnknownOrExpired)
}

impl<S, B> Service<ServiceRequest> for SessionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let auth = self.auth.clone();
        let on_missing = self.on_missing;

        Box::pin(async move {
            let path_str = req.path().to_string();
            let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

            match resolve_session(token, &auth).await {
                Ok(user) => {
                    log::debug!("Session user {} on {}", user.user_id, path_str);
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(session_error) => {
                    match &session_error {
                        SessionError::Lookup(_) => {
                            log::error!("{}", session_error.log_message(&path_str))
                        }
                        _ => log::debug!("{}", session_error.log_message(&path_str)),
                    }
                    let (http_req, _payload) = req.into_parts();
                    let response = on_missing.response().map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Extracts the user the session middleware attached to the request.
pub struct AuthenticatedUser(pub SessionUser);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<SessionUser>() {
            Some(user) => ok(AuthenticatedUser(user.clone())),
            None => {
                log::warn!(
                    "AuthenticatedUser extractor: no session user for path {}; route is missing SessionMiddleware",
                    req.path()
                );
                ready(Err(actix_web::error::ErrorUnauthorized("not signed in")))
            }
        }
    }
}
