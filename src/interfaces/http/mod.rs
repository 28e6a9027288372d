use crate::application::use_cases::batch_analysis::{
    BatchAnalysisUseCase, BatchEvent, BatchFailure, RawFile,
};
use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::Photo;
use crate::domain::report::RenderedReport;
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::image_codec::decode_base64_image;
use crate::interfaces::state::AppState;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{dev::Server, delete, get, post, put, web, App, HttpResponse, HttpServer, Responder};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use validator::Validate;

/// Upload requests carry whole images as base64.
const JSON_LIMIT: usize = 64 * 1024 * 1024;
const LOG_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub app: Arc<AppState>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, message = "image_base64 must not be empty"))]
    pub image_base64: String,
    #[validate(length(min = 1, max = 255, message = "file_name must be 1-255 characters"))]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeBatchRequest {
    #[serde(default)]
    pub images: Vec<AnalyzeRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotesRequest {
    #[validate(length(max = 4096, message = "notes must be at most 4096 characters"))]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    #[serde(default)]
    pub flagged: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

impl ReportQuery {
    fn wants_json(&self) -> bool {
        self.format
            .as_deref()
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub fn error_response(err: &AppError) -> HttpResponse {
    let message = err.to_string();
    let body = ErrorBody { error: &message };
    match err {
        AppError::NotFound(_) => HttpResponse::NotFound().json(body),
        AppError::ValidationError(_) => HttpResponse::BadRequest().json(body),
        AppError::Codec(_) => HttpResponse::UnprocessableEntity().json(body),
        AppError::Analysis { reason, .. } => analysis_status(Some(*reason)).json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

fn analysis_status(reason: Option<AnalysisFailure>) -> actix_web::HttpResponseBuilder {
    match reason {
        None | Some(AnalysisFailure::Rejected) => HttpResponse::UnprocessableEntity(),
        Some(_) => HttpResponse::BadGateway(),
    }
}

fn failure_response(failure: &BatchFailure) -> HttpResponse {
    analysis_status(failure.reason).json(ErrorBody {
        error: &failure.detail,
    })
}

fn respond<T: Serialize>(result: Result<T>) -> HttpResponse {
    match result {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(e) => error_response(&e),
    }
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::ValidationError(err.to_string())
}

fn decode_file(image: &AnalyzeRequest) -> Result<RawFile> {
    image.validate().map_err(validation_error)?;
    let bytes = decode_base64_image(&image.image_base64)?;
    Ok(RawFile::new(image.file_name.clone(), bytes))
}

/// Batch entries never fail the request; an unreadable entry fails on its own task.
fn batch_file(image: &AnalyzeRequest) -> RawFile {
    match decode_file(image) {
        Ok(file) => file,
        Err(AppError::Codec(detail)) | Err(AppError::ValidationError(detail)) => {
            RawFile::unreadable(image.file_name.clone(), detail)
        }
        Err(e) => RawFile::unreadable(image.file_name.clone(), e.to_string()),
    }
}

fn photo_not_found(photo_id: &str) -> AppError {
    AppError::NotFound(format!("photo {}", photo_id))
}

#[get("/")]
async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "Safety Vision API" }))
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "provider": data.app.vision_config.provider,
        "model": data.app.vision_config.model,
        "visionConfigured": data.app.vision_configured(),
        "batchActive": data.app.batch_use_case.is_active().await,
        "previews": data.app.previews.len(),
    }))
}

#[post("/analyze")]
async fn analyze(data: web::Data<HttpState>, req: web::Json<AnalyzeRequest>) -> impl Responder {
    let file = match decode_file(&req) {
        Ok(file) => file,
        Err(e) => return error_response(&e),
    };

    add_log(
        &data.logs,
        "INFO",
        "HttpApi",
        &format!("Analyzing photo: {}", req.file_name),
    );

    let outcome = match data.app.batch_use_case.run_batch(vec![file]).await {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&e),
    };

    if let Some(photo) = outcome.photos.into_iter().next() {
        return HttpResponse::Ok().json(photo);
    }
    match outcome.failures.first() {
        Some(failure) => failure_response(failure),
        None => error_response(&AppError::Internal("analysis produced no result".to_string())),
    }
}

#[post("/analyze-batch")]
async fn analyze_batch(
    data: web::Data<HttpState>,
    req: web::Json<AnalyzeBatchRequest>,
) -> impl Responder {
    let files: Vec<RawFile> = req.images.iter().map(batch_file).collect();

    add_log(
        &data.logs,
        "INFO",
        "HttpApi",
        &format!("Analyzing batch of {} photo(s)", files.len()),
    );

    respond(data.app.batch_use_case.run_batch(files).await)
}

#[get("/uploads")]
async fn uploads(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.app.batch_use_case.upload_snapshot().await)
}

#[get("/photos")]
async fn list_photos(data: web::Data<HttpState>, query: web::Query<PhotoQuery>) -> impl Responder {
    let store = data.app.session.read().await;
    if query.flagged.unwrap_or(false) {
        let flagged: Vec<&Photo> = store.flagged_photos().collect();
        return HttpResponse::Ok().json(flagged);
    }
    HttpResponse::Ok().json(store.photos())
}

#[get("/selection")]
async fn get_selection(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.app.session.read().await.selected())
}

#[delete("/selection")]
async fn clear_selection(data: web::Data<HttpState>) -> impl Responder {
    data.app.session.write().await.clear_selection();
    HttpResponse::NoContent().finish()
}

#[get("/photos/{id}")]
async fn get_photo(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();
    let store = data.app.session.read().await;
    match store.get(&photo_id) {
        Some(photo) => HttpResponse::Ok().json(photo),
        None => error_response(&photo_not_found(&photo_id)),
    }
}

#[get("/photos/{id}/preview")]
async fn photo_preview(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();
    let handle = {
        let store = data.app.session.read().await;
        match store.get(&photo_id) {
            Some(photo) => photo.preview_reference.clone(),
            None => return error_response(&photo_not_found(&photo_id)),
        }
    };

    match data.app.previews.get(&handle) {
        Some(bytes) => {
            let content_type = image::guess_format(&bytes)
                .map(|format| format.to_mime_type())
                .unwrap_or("application/octet-stream");
            HttpResponse::Ok()
                .content_type(content_type)
                .body(bytes.to_vec())
        }
        None => error_response(&AppError::NotFound(format!("preview {}", handle))),
    }
}

#[put("/photos/{id}/notes")]
async fn update_notes(
    data: web::Data<HttpState>,
    path: web::Path<String>,
    req: web::Json<NotesRequest>,
) -> impl Responder {
    if let Err(e) = req.validate() {
        return error_response(&validation_error(e));
    }
    let photo_id = path.into_inner();
    let mut store = data.app.session.write().await;
    let result = store
        .update_notes(&photo_id, req.into_inner().notes)
        .and_then(|_| store.get(&photo_id).cloned().ok_or_else(|| photo_not_found(&photo_id)));
    respond(result)
}

#[post("/photos/{id}/flag")]
async fn toggle_flag(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();
    let result = data.app.session.write().await.toggle_flag(&photo_id);
    respond(result.map(|flagged| json!({ "photoId": photo_id, "flaggedForFollowUp": flagged })))
}

#[post("/photos/{id}/select")]
async fn select_photo(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();
    let mut store = data.app.session.write().await;
    let result = store
        .select(&photo_id)
        .and_then(|_| store.selected().cloned().ok_or_else(|| photo_not_found(&photo_id)));
    respond(result)
}

#[delete("/photos/{id}")]
async fn delete_photo(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();
    let result = data.app.session.write().await.delete_photo(&photo_id);
    if let Ok(photo) = &result {
        add_log(
            &data.logs,
            "INFO",
            "Session",
            &format!("Photo removed from analysis: {}", photo.file_name),
        );
    }
    respond(result)
}

#[get("/stats")]
async fn stats(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.app.session.read().await.compute_stats())
}

#[get("/reports/batch")]
async fn batch_report(data: web::Data<HttpState>, query: web::Query<ReportQuery>) -> impl Responder {
    let service = &data.app.report_service;
    if query.wants_json() {
        return respond(service.document_batch().await);
    }
    report_download(&data.logs, service.export_batch().await)
}

#[get("/reports/photos/{id}")]
async fn photo_report(
    data: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<ReportQuery>,
) -> impl Responder {
    let photo_id = path.into_inner();
    let service = &data.app.report_service;
    if query.wants_json() {
        return respond(service.document_photo(&photo_id).await);
    }
    report_download(&data.logs, service.export_photo(&photo_id).await)
}

fn report_download(logs: &Mutex<Vec<LogEntry>>, result: Result<RenderedReport>) -> HttpResponse {
    match result {
        Ok(report) => {
            add_log(
                logs,
                "INFO",
                "Reports",
                &format!("Report generated: {}", report.file_name),
            );
            HttpResponse::Ok()
                .content_type(report.content_type)
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", report.file_name),
                ))
                .body(report.bytes)
        }
        Err(e) => {
            add_log(
                logs,
                "ERROR",
                "Reports",
                &format!("Failed to generate report: {}", e),
            );
            error_response(&e)
        }
    }
}

#[get("/notifications")]
async fn notifications(data: web::Data<HttpState>) -> impl Responder {
    let logs = data.logs.lock().unwrap_or_else(|e| e.into_inner());
    HttpResponse::Ok().json(&*logs)
}

pub fn add_log_entry(
    logs: &Mutex<Vec<LogEntry>>,
    level: &str,
    source: &str,
    message: &str,
) -> LogEntry {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap_or_else(|e| e.into_inner());
    logs.push(entry.clone());
    if logs.len() > LOG_CAPACITY {
        logs.remove(0);
    }
    entry
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, level, source, message);
}

/// User-visible notification for a batch event, if it warrants one.
pub fn notification_for(event: &BatchEvent) -> Option<(&'static str, String)> {
    match event {
        BatchEvent::PhotoAnalyzed {
            file_name,
            risk_level,
        } => Some((
            "INFO",
            format!("Analyzed {}: {} risk", file_name, risk_level),
        )),
        BatchEvent::PhotoFailed { file_name, detail } => Some((
            "ERROR",
            format!("Failed to analyze {}: {}", file_name, detail),
        )),
        BatchEvent::BatchFinished { succeeded, failed } => Some((
            "INFO",
            format!(
                "Batch finished: {} analyzed, {} failed",
                succeeded, failed
            ),
        )),
        BatchEvent::BatchStarted { .. } | BatchEvent::TaskUpdated { .. } => None,
    }
}

/// Copies batch notifications into the log ring until the channel closes.
pub fn spawn_notification_relay(
    batch: &BatchAnalysisUseCase,
    logs: Arc<Mutex<Vec<LogEntry>>>,
) -> tokio::task::JoinHandle<()> {
    let mut events = batch.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some((level, message)) = notification_for(&event) {
                        add_log(&logs, level, "Batch", &message);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification relay lagged behind batch events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT))
            .service(root)
            .service(health)
            .service(analyze)
            .service(analyze_batch)
            .service(uploads)
            .service(list_photos)
            .service(get_selection)
            .service(clear_selection)
            .service(photo_preview)
            .service(update_notes)
            .service(toggle_flag)
            .service(select_photo)
            .service(get_photo)
            .service(delete_photo)
            .service(stats)
            .service(batch_report)
            .service(photo_report)
            .service(notifications),
    );
}

pub fn start_server(app: Arc<AppState>, config: &ServerConfig) -> std::io::Result<Server> {
    let logs = app.logs.clone();
    let state = web::Data::new(HttpState { app, logs });

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!(host = %config.host, port = config.port, "HTTP API listening");
    Ok(server)
}
