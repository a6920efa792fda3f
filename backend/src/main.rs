mod auth;
mod config;
mod db;
mod imaging;
mod inference;
mod pages;
mod routes;
mod storage;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};
use auth::password::PasswordHasher;
use auth::service::AuthService;
use config::AppConfig;
use db::feedback_repository::FeedbackRepository;
use db::session_repository::SessionRepository;
use db::user_repository::UserRepository;
use imaging::dicom::DicomConverter;
use inference::config::ClassifierConfig;
use inference::service::InferenceService;
use routes::{AppState, configure_app};
use std::env;
use storage::uploads::UploadStore;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let classifier_config = ClassifierConfig::load_or_default(&config.classifier_config_path)
        .map_err(|e| startup_error("Classifier config failed", e))?;
    let classifier = inference::load_classifier(&config.model_path, &classifier_config)
        .map_err(|e| startup_error("Model loading failed", e))?;
    let inference = InferenceService::new(classifier, &classifier_config)
        .map_err(|e| startup_error("Preprocessor setup failed", e))?;

    let pool = db::connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Database connection failed", e))?;
    db::init_schema(&pool)
        .await
        .map_err(|e| startup_error("Database schema setup failed", e))?;

    let uploads = UploadStore::new(&config.upload_dir, config.max_upload_bytes);
    uploads
        .ensure_dir()
        .map_err(|e| startup_error("Upload directory setup failed", e))?;

    let auth = AuthService::new(
        UserRepository::new(pool.clone()),
        SessionRepository::new(pool.clone()),
        PasswordHasher::new(config.password_iterations),
        chrono::Duration::hours(config.session_ttl_hours),
    );
    let state = AppState {
        auth,
        feedback: FeedbackRepository::new(pool),
        uploads,
        dicom: DicomConverter::new(config.max_dicom_pixels),
        inference,
    };

    log::info!("Uploads stored in {}", config.upload_dir.display());
    log::info!("Starting server on {}", config.bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| configure_app(cfg, &state))
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
