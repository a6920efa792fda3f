use std::path::{Path, PathBuf};
use std::str::FromStr;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::{StatusCode, header};
use actix_web::{Error, HttpResponse, web};
use birads_shared::{BiradsClass, FeedbackRecordView, FeedbackVerdict};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::{AuthenticatedUser, OnMissingSession, SessionMiddleware};
use crate::auth::routes as auth_routes;
use crate::auth::service::AuthService;
use crate::db::RepositoryError;
use crate::db::feedback_repository::FeedbackRepository;
use crate::db::models::{FeedbackRecord, NewFeedback};
use crate::imaging::dicom::{DicomConverter, DicomError};
use crate::imaging::preprocess::PreprocessError;
use crate::inference::classifier::Prediction;
use crate::inference::service::{ClassifyImageError, InferenceService};
use crate::pages;
use crate::storage::uploads::{self, PUBLIC_PREFIX, UploadError, UploadKind, UploadStore};

const RECENT_FEEDBACK_LIMIT: i64 = 10;
const API_FEEDBACK_LIMIT: i64 = 100;

/// Everything the handlers need, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub feedback: FeedbackRepository,
    pub uploads: UploadStore,
    pub dicom: DicomConverter,
    pub inference: InferenceService,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_app(cfg: &mut web::ServiceConfig, state: &AppState) {
    let page_session = SessionMiddleware::new(state.auth.clone(), OnMissingSession::RedirectToSignIn);
    let api_session = SessionMiddleware::new(state.auth.clone(), OnMissingSession::Unauthorized);

    cfg.app_data(web::Data::new(state.auth.clone()))
        .app_data(web::Data::new(state.feedback.clone()))
        .app_data(web::Data::new(state.uploads.clone()))
        .app_data(web::Data::new(state.dicom))
        .app_data(web::Data::new(state.inference.clone()))
        .service(web::resource("/").route(web::get().to(auth_routes::sign_in_page)))
        .service(web::resource("/sign-in").route(web::post().to(auth_routes::sign_in)))
        .service(
            web::resource("/sign-up")
                .route(web::get().to(auth_routes::sign_up_page))
                .route(web::post().to(auth_routes::sign_up)),
        )
        .service(web::resource("/logout").route(web::get().to(auth_routes::logout)))
        .service(
            web::resource("/dashboard")
                .route(web::get().to(dashboard))
                .wrap(page_session.clone()),
        )
        .service(
            web::resource("/classify")
                .route(web::get().to(classify_page))
                .route(web::post().to(classify_upload))
                .wrap(page_session.clone()),
        )
        .service(
            web::resource("/feedback")
                .route(web::post().to(submit_feedback))
                .wrap(page_session.clone()),
        )
        .service(
            web::resource("/api/feedback")
                .route(web::get().to(list_feedback))
                .wrap(api_session),
        )
        .service(
            web::scope(&format!("/{}", PUBLIC_PREFIX))
                .wrap(page_session)
                .service(Files::new("", state.uploads.dir().to_path_buf())),
        );
}

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

fn to_views(records: &[FeedbackRecord]) -> Result<Vec<FeedbackRecordView>, RepositoryError> {
    records.iter().map(FeedbackRecord::to_view).collect()
}

async fn dashboard(
    user: AuthenticatedUser,
    feedback_repo: web::Data<FeedbackRepository>,
) -> HttpResponse {
    let recent = feedback_repo
        .get_recent_feedback(RECENT_FEEDBACK_LIMIT)
        .await
        .and_then(|records| to_views(&records));
    match recent {
        Ok(recent) => html(StatusCode::OK, pages::dashboard(&user.0.username, &recent)),
        Err(e) => {
            error!("Failed to load recent feedback: {:?}", e);
            html(StatusCode::OK, pages::dashboard(&user.0.username, &[]))
        }
    }
}

async fn classify_page(_user: AuthenticatedUser) -> HttpResponse {
    html(StatusCode::OK, pages::classify(None, None))
}

struct UploadedFile {
    file_name: String,
    data: Vec<u8>,
    too_large: bool,
}

/// Reads the `file` part of the form, draining every other part.
async fn read_file_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<Option<UploadedFile>, Error> {
    let mut upload = None;
    while let Some(mut field) = payload.try_next().await? {
        let is_file = field.name() == Some("file");
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut data = Vec::new();
        let mut too_large = false;
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if !is_file || too_large {
                continue;
            }
            if data.len() + chunk.len() > max_bytes {
                too_large = true;
                data = Vec::new();
                continue;
            }
            data.extend_from_slice(&chunk);
        }

        if is_file && upload.is_none() {
            upload = Some(UploadedFile {
                file_name,
                data,
                too_large,
            });
        }
    }
    Ok(upload)
}

#[derive(Debug, thiserror::Error)]
enum ClassifyError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Dicom(#[from] DicomError),
    #[error(transparent)]
    Image(#[from] ClassifyImageError),
}

impl ClassifyError {
    fn status(&self) -> StatusCode {
        match self {
            ClassifyError::Upload(UploadError::UnsupportedType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ClassifyError::Upload(UploadError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ClassifyError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ClassifyError::Dicom(DicomError::Write(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ClassifyError::Dicom(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClassifyError::Image(ClassifyImageError::Preprocess(PreprocessError::Decode(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ClassifyError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self.status() {
            StatusCode::UNPROCESSABLE_ENTITY => {
                format!("The uploaded file could not be read as an image: {}", self)
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                "Classification failed on the server. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Save, convert DICOM to PNG when needed, classify. Runs on the blocking pool.
///
/// Nothing written for the upload is kept when classification fails.
fn process_upload(
    uploads: &UploadStore,
    dicom: &DicomConverter,
    inference: &InferenceService,
    file_name: &str,
    kind: UploadKind,
    data: &[u8],
) -> Result<(Prediction, PathBuf), ClassifyError> {
    let saved = uploads.save(file_name, data)?;
    let mut written = vec![saved.clone()];
    let outcome = classify_saved(uploads, dicom, inference, &saved, kind, &mut written);
    if outcome.is_err() {
        let paths: Vec<&Path> = written.iter().map(PathBuf::as_path).collect();
        uploads::discard(&paths);
    }
    outcome
}

fn classify_saved(
    uploads: &UploadStore,
    dicom: &DicomConverter,
    inference: &InferenceService,
    saved: &Path,
    kind: UploadKind,
    written: &mut Vec<PathBuf>,
) -> Result<(Prediction, PathBuf), ClassifyError> {
    let image_path = match kind {
        UploadKind::Dicom => {
            let png_path = uploads.reserve_png_sibling(saved)?;
            written.push(png_path.clone());
            dicom.convert_to_png(saved, &png_path)?;
            info!("Converted {} to {}", saved.display(), png_path.display());
            png_path
        }
        UploadKind::Raster => saved.to_path_buf(),
    };
    let prediction = inference.classify_image(&image_path)?;
    Ok((prediction, image_path))
}

async fn classify_upload(
    _user: AuthenticatedUser,
    uploads: web::Data<UploadStore>,
    dicom: web::Data<DicomConverter>,
    inference: web::Data<InferenceService>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let Some(upload) = read_file_field(&mut payload, uploads.max_bytes()).await? else {
        return Ok(see_other("/classify"));
    };
    if upload.file_name.is_empty() {
        return Ok(see_other("/classify"));
    }
    let Some(file_name) = uploads::secure_filename(&upload.file_name) else {
        warn!("Rejected upload name {:?}", upload.file_name);
        return Ok(see_other("/classify"));
    };

    let precheck = uploads::upload_kind(&file_name).and_then(|kind| {
        if upload.too_large {
            Err(UploadError::FileTooLarge {
                size: uploads.max_bytes() + 1,
                limit: uploads.max_bytes(),
            })
        } else {
            Ok(kind)
        }
    });
    let kind = match precheck {
        Ok(kind) => kind,
        Err(e) => {
            let e = ClassifyError::from(e);
            warn!("Rejected upload {}: {}", file_name, e);
            return Ok(html(e.status(), pages::classify(None, Some(&e.user_message()))));
        }
    };

    let store = uploads.get_ref().clone();
    let converter = *dicom.get_ref();
    let service = inference.get_ref().clone();
    let name = file_name.clone();
    let outcome = web::block(move || {
        process_upload(&store, &converter, &service, &name, kind, &upload.data)
    })
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    match outcome {
        Ok((prediction, image_path)) => {
            let public_path = UploadStore::public_path(&image_path);
            info!("Relative file path: {}", public_path);
            let response = prediction.to_response(public_path);
            Ok(html(StatusCode::OK, pages::classify(Some(&response), None)))
        }
        Err(e) => {
            if e.status() == StatusCode::INTERNAL_SERVER_ERROR {
                error!("Classification of {} failed: {:?}", file_name, e);
            } else {
                warn!("Classification of {} rejected: {}", file_name, e);
            }
            Ok(html(e.status(), pages::classify(None, Some(&e.user_message()))))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackForm {
    pub file_path: String,
    pub prediction: String,
    pub feedback: String,
    pub correct_class: Option<String>,
}

/// Checks a feedback form against the label set and the classified images on disk.
///
/// Only raster paths qualify: a DICOM upload is classified through its PNG.
fn parse_feedback(form: FeedbackForm, uploads: &UploadStore) -> Result<NewFeedback, String> {
    let file_path = form.file_path.trim().to_string();
    let file_name = file_path
        .strip_prefix(PUBLIC_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| format!("Unknown image '{}'.", file_path))?;
    if uploads::secure_filename(file_name).as_deref() != Some(file_name)
        || !matches!(uploads::upload_kind(file_name), Ok(UploadKind::Raster))
        || !uploads.dir().join(file_name).is_file()
    {
        return Err(format!("Unknown image '{}'.", file_path));
    }

    let prediction = BiradsClass::from_str(form.prediction.trim())
        .map_err(|_| format!("Unknown prediction '{}'.", form.prediction))?;
    let verdict = FeedbackVerdict::from_str(form.feedback.trim())
        .map_err(|_| format!("Feedback must be 'agree' or 'disagree', got '{}'.", form.feedback))?;
    let correct_class = match form.correct_class.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(label) => Some(
            BiradsClass::from_str(label).map_err(|_| format!("Unknown class '{}'.", label))?,
        ),
    };

    Ok(NewFeedback::new(file_path, prediction, verdict, correct_class))
}

async fn submit_feedback(
    _user: AuthenticatedUser,
    feedback_repo: web::Data<FeedbackRepository>,
    uploads: web::Data<UploadStore>,
    form: web::Form<FeedbackForm>,
) -> HttpResponse {
    let feedback = match parse_feedback(form.into_inner(), &uploads) {
        Ok(feedback) => feedback,
        Err(message) => {
            warn!("Rejected feedback: {}", message);
            return html(StatusCode::BAD_REQUEST, pages::classify(None, Some(&message)));
        }
    };

    match feedback_repo.create_feedback(&feedback).await {
        Ok(record) => {
            info!(
                "Stored feedback {} for {} ({})",
                record.id, record.file_path, record.feedback
            );
            see_other("/classify")
        }
        Err(e) => {
            error!("Failed to store feedback: {:?}", e);
            html(
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::error("Your feedback could not be saved. Please try again."),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub file_path: Option<String>,
}

async fn list_feedback(
    _user: AuthenticatedUser,
    feedback_repo: web::Data<FeedbackRepository>,
    query: web::Query<FeedbackQuery>,
) -> HttpResponse {
    let records = match &query.file_path {
        Some(file_path) => feedback_repo.get_feedback_by_file_path(file_path).await,
        None => feedback_repo.get_recent_feedback(API_FEEDBACK_LIMIT).await,
    };
    match records.and_then(|records| to_views(&records)) {
        Ok(views) => HttpResponse::Ok().json(views),
        Err(e) => {
            error!("Failed to list feedback: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to list feedback".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::testing::auth_service;
    use crate::db::testing::memory_pool;
    use crate::db::user_repository::UserRepository;
    use crate::imaging::dicom::testing::write_test_dicom;
    use crate::inference::classifier::testing::StubClassifier;
    use crate::inference::config::ClassifierConfig;
    use actix_web::cookie::Cookie;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::{App, test};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BOUNDARY: &str = "----biradsTestBoundary";

    struct Harness {
        state: AppState,
        users: UserRepository,
        _dir: TempDir,
    }

    async fn harness(max_upload_bytes: usize) -> Harness {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::new(dir.path().join("uploads"), max_upload_bytes);
        uploads.ensure_dir().unwrap();
        let inference = InferenceService::new(
            Arc::new(StubClassifier::peaked_at(2)),
            &ClassifierConfig::default(),
        )
        .unwrap();
        Harness {
            state: AppState {
                auth: auth_service(pool.clone()),
                feedback: FeedbackRepository::new(pool.clone()),
                uploads,
                dicom: DicomConverter::default(),
                inference,
            },
            users: UserRepository::new(pool),
            _dir: dir,
        }
    }

    fn location(resp: &ServiceResponse) -> Option<String> {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    async fn body_text(resp: ServiceResponse) -> String {
        String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([30, 90, 200])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart(field: &str, file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }

    async fn sign_up_and_in<S>(app: &S) -> Cookie<'static>
    where
        S: Service<actix_http::Request, Response = ServiceResponse, Error = Error>,
    {
        let req = test::TestRequest::post()
            .uri("/sign-up")
            .set_form([
                ("username", "Dana"),
                ("email", "dana@example.com"),
                ("password", "hunter22"),
                ("user_type", "radiologist"),
            ])
            .to_request();
        let resp = test::call_service(app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));

        let req = test::TestRequest::post()
            .uri("/sign-in")
            .set_form([("email", "dana@example.com"), ("password", "hunter22")])
            .to_request();
        let resp = test::call_service(app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/dashboard"));
        resp.response()
            .cookies()
            .find(|c| c.name() == "session")
            .map(|c| c.into_owned())
            .unwrap()
    }

    async fn upload<S>(app: &S, cookie: &Cookie<'static>, file_name: &str, data: &[u8]) -> ServiceResponse
    where
        S: Service<actix_http::Request, Response = ServiceResponse, Error = Error>,
    {
        let (content_type, body) = multipart("file", file_name, data);
        let req = test::TestRequest::post()
            .uri("/classify")
            .cookie(cookie.clone())
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        test::call_service(app, req).await
    }

    #[actix_web::test]
    async fn duplicate_sign_up_shows_error_without_second_record() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        sign_up_and_in(&app).await;

        let req = test::TestRequest::post()
            .uri("/sign-up")
            .set_form([
                ("username", "Other"),
                ("email", "dana@example.com"),
                ("password", "x"),
                ("user_type", "physician"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(location(&resp).is_none());
        assert!(body_text(resp).await.contains("Email already exists"));
        assert_eq!(h.users.count_by_email("dana@example.com").await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn bad_credentials_render_inline_error() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        sign_up_and_in(&app).await;

        let req = test::TestRequest::post()
            .uri("/sign-in")
            .set_form([("email", "dana@example.com"), ("password", "wrong")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.response().cookies().next().is_none());
        assert!(body_text(resp).await.contains("Invalid email or password"));
    }

    #[actix_web::test]
    async fn dashboard_requires_session_and_logout_ends_it() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/dashboard").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));

        let cookie = sign_up_and_in(&app).await;
        let req = test::TestRequest::get().uri("/dashboard").cookie(cookie.clone()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("Welcome, Dana"));

        let req = test::TestRequest::get().uri("/logout").cookie(cookie.clone()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));

        let req = test::TestRequest::get().uri("/dashboard").cookie(cookie).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));
    }

    #[actix_web::test]
    async fn classifies_png_upload() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let resp = upload(&app, &cookie, "left breast.png", &png_bytes()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(body.contains("Prediction: BIRADS 3"));
        assert!(body.contains("value=\"uploads/left_breast.png\""));
        assert!(h.state.uploads.dir().join("left_breast.png").is_file());

        let req = test::TestRequest::get()
            .uri("/uploads/left_breast.png")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/uploads/left_breast.png").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));

        let resp = upload(&app, &cookie, "left breast.png", &png_bytes()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("value=\"uploads/left_breast-1.png\""));
        assert!(h.state.uploads.dir().join("left_breast.png").is_file());
    }

    #[actix_web::test]
    async fn converts_dicom_before_classifying() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let scratch = tempfile::tempdir().unwrap();
        let dicom_path = scratch.path().join("scan.dcm");
        write_test_dicom(&dicom_path, &[0, 400, 800, 1200], 2, 2, Some("1"));
        let data = std::fs::read(&dicom_path).unwrap();

        let resp = upload(&app, &cookie, "Scan.DCM", &data).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("value=\"uploads/Scan.png\""));
        assert!(h.state.uploads.dir().join("Scan.DCM").is_file());
        assert!(h.state.uploads.dir().join("Scan.png").is_file());
    }

    #[actix_web::test]
    async fn malformed_and_unsupported_uploads_report_errors() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let resp = upload(&app, &cookie, "broken.dcm", b"garbage").await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(resp).await.contains("could not be read"));

        assert!(!h.state.uploads.dir().join("broken.dcm").exists());
        assert!(!h.state.uploads.dir().join("broken.png").exists());

        let resp = upload(&app, &cookie, "broken.png", b"garbage").await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!h.state.uploads.dir().join("broken.png").exists());

        let resp = upload(&app, &cookie, "notes.txt", b"hello").await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(!h.state.uploads.dir().join("notes.txt").exists());
    }

    #[actix_web::test]
    async fn missing_or_empty_file_redirects() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let resp = upload(&app, &cookie, "", b"").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/classify"));

        let (content_type, body) = multipart("other", "x.png", &png_bytes());
        let req = test::TestRequest::post()
            .uri("/classify")
            .cookie(cookie)
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let h = harness(16).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let resp = upload(&app, &cookie, "big.png", &png_bytes()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!h.state.uploads.dir().join("big.png").exists());
    }

    #[actix_web::test]
    async fn feedback_persists_one_record_per_submission() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;
        let resp = upload(&app, &cookie, "scan.png", &png_bytes()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/feedback")
            .cookie(cookie.clone())
            .set_form([
                ("file_path", "uploads/scan.png"),
                ("prediction", "BIRADS 3"),
                ("feedback", "disagree"),
                ("correct_class", "BIRADS 4"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/classify"));

        let records = h.state.feedback.get_feedback_by_file_path("uploads/scan.png").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prediction, "BIRADS 3");
        assert_eq!(records[0].correct_class.as_deref(), Some("BIRADS 4"));

        let req = test::TestRequest::get()
            .uri("/api/feedback?file_path=uploads/scan.png")
            .cookie(cookie)
            .to_request();
        let views: Vec<FeedbackRecordView> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].feedback, FeedbackVerdict::Disagree);
    }

    #[actix_web::test]
    async fn invalid_feedback_is_rejected() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;
        upload(&app, &cookie, "scan.png", &png_bytes()).await;

        for form in [
            [("file_path", "uploads/scan.png"), ("prediction", "BIRADS 9"), ("feedback", "agree")],
            [("file_path", "uploads/scan.png"), ("prediction", "BIRADS 2"), ("feedback", "maybe")],
            [("file_path", "uploads/missing.png"), ("prediction", "BIRADS 2"), ("feedback", "agree")],
            [("file_path", "../feedback.db"), ("prediction", "BIRADS 2"), ("feedback", "agree")],
        ] {
            let req = test::TestRequest::post()
                .uri("/feedback")
                .cookie(cookie.clone())
                .set_form(form)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(h.state.feedback.get_recent_feedback(10).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn feedback_needs_a_classified_image() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let resp = upload(&app, &cookie, "broken.png", b"garbage").await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let scratch = tempfile::tempdir().unwrap();
        let dicom_path = scratch.path().join("scan.dcm");
        write_test_dicom(&dicom_path, &[0, 400, 800, 1200], 2, 2, None);
        let resp = upload(&app, &cookie, "scan.dcm", &std::fs::read(&dicom_path).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        for file_path in ["uploads/broken.png", "uploads/scan.dcm"] {
            let req = test::TestRequest::post()
                .uri("/feedback")
                .cookie(cookie.clone())
                .set_form([("file_path", file_path), ("prediction", "BIRADS 3"), ("feedback", "agree")])
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", file_path);
        }
        assert!(h.state.feedback.get_recent_feedback(10).await.unwrap().is_empty());

        let req = test::TestRequest::post()
            .uri("/feedback")
            .cookie(cookie)
            .set_form([("file_path", "uploads/scan.png"), ("prediction", "BIRADS 3"), ("feedback", "agree")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[actix_web::test]
    async fn oversized_dicom_header_is_rejected_and_removed() {
        let mut h = harness(1 << 20).await;
        h.state.dicom = DicomConverter::new(3);
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let cookie = sign_up_and_in(&app).await;

        let scratch = tempfile::tempdir().unwrap();
        let dicom_path = scratch.path().join("big.dcm");
        write_test_dicom(&dicom_path, &[0, 400, 800, 1200], 2, 2, None);
        let resp = upload(&app, &cookie, "big.dcm", &std::fs::read(&dicom_path).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!h.state.uploads.dir().join("big.dcm").exists());
        assert!(!h.state.uploads.dir().join("big.png").exists());
    }

    #[actix_web::test]
    async fn api_without_session_is_unauthorized() {
        let h = harness(1 << 20).await;
        let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &h.state))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/feedback").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/feedback")
            .set_form([("file_path", "uploads/a.png"), ("prediction", "BIRADS 1"), ("feedback", "agree")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp).as_deref(), Some("/"));
    }
}
