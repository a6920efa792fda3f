use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, web};
use log::error;

use super::middleware::SESSION_COOKIE;
use super::models::{SignInForm, SignUpForm};
use super::service::{AuthError, AuthService};
use crate::pages;

fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub async fn sign_in_page() -> HttpResponse {
    html(StatusCode::OK, pages::sign_in(None))
}

pub async fn sign_up_page() -> HttpResponse {
    html(StatusCode::OK, pages::sign_up(None))
}

pub async fn sign_up(auth: web::Data<AuthService>, form: web::Form<SignUpForm>) -> HttpResponse {
    match auth.register(form.into_inner()).await {
        Ok(_) => see_other("/"),
        Err(e @ AuthError::EmailTaken) => {
            html(StatusCode::CONFLICT, pages::sign_up(Some(&e.to_string())))
        }
        Err(e) if e.is_user_facing() => {
            html(StatusCode::BAD_REQUEST, pages::sign_up(Some(&e.to_string())))
        }
        Err(e) => {
            error!("Sign-up failed: {:?}", e);
            html(
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::sign_up(Some("Sign-up is temporarily unavailable. Please try again.")),
            )
        }
    }
}

pub async fn sign_in(auth: web::Data<AuthService>, form: web::Form<SignInForm>) -> HttpResponse {
    match auth.sign_in(&form.email, &form.password).await {
        Ok(session) => {
            let cookie = Cookie::build(SESSION_COOKIE, session.token)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(CookieDuration::seconds(session.max_age_seconds))
                .finish();
            HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/dashboard"))
                .cookie(cookie)
                .finish()
        }
        Err(e) if e.is_user_facing() => {
            html(StatusCode::UNAUTHORIZED, pages::sign_in(Some(&e.to_string())))
        }
        Err(e) => {
            error!("Sign-in failed: {:?}", e);
            html(
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::sign_in(Some("Sign-in is temporarily unavailable. Please try again.")),
            )
        }
    }
}

pub async fn logout(req: HttpRequest, auth: web::Data<AuthService>) -> HttpResponse {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if let Err(e) = auth.sign_out(cookie.value()).await {
            error!("Failed to close session: {:?}", e);
        }
    }
    let removal = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .finish();
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(removal)
        .finish()
}
