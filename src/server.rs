use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use article_lookup_lib::{logger, AppConfig, HttpLookupClient, Lookup, LookupError};

mod job_manager;
use job_manager::{JobManager, JobSignal};

struct AppState {
    job_manager: Arc<JobManager>,
    lookup: Arc<dyn Lookup>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(rename = "searchTerm")]
    search_term: String,
}

const ACCEPTED_EXTENSIONS: [&str; 5] = ["csv", "tsv", "xlsx", "xls", "ods"];

fn upload_extension(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        "csv".to_string()
    }
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("Server is running")
}

/// Single-article search: one lookup, payload passed through as text.
#[get("/api/search")]
async fn search_code(query: web::Query<SearchQuery>, data: web::Data<AppState>) -> HttpResponse {
    let term = query.search_term.trim();
    if term.is_empty() {
        return HttpResponse::BadRequest().json("Missing search term");
    }

    match data.lookup.lookup(term).await {
        Ok(payload) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(payload),
        Err(LookupError::Timeout) => {
            log::warn!("Search for '{}' timed out", term);
            HttpResponse::GatewayTimeout().json("Lookup service timed out")
        }
        Err(e) => {
            log::warn!("Search for '{}' failed: {}", term, e);
            HttpResponse::BadGateway().json(e.to_string())
        }
    }
}

fn discard_upload(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not remove partial upload {:?}: {}", path, e);
    }
}

#[post("/api/upload")]
async fn upload_file(mut payload: Multipart, data: web::Data<AppState>) -> HttpResponse {
    let upload_dir = PathBuf::from(&data.job_manager.config().upload_dir);
    if let Err(e) = std::fs::create_dir_all(&upload_dir) {
        log::error!("Could not create upload dir: {}", e);
        return HttpResponse::InternalServerError().json("Could not store the upload");
    }

    let job_id = Uuid::new_v4().to_string();
    let mut saved: Option<(PathBuf, String)> = None;

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::error!("Malformed multipart upload: {}", e);
                if let Some((path, _)) = &saved {
                    discard_upload(path);
                }
                return HttpResponse::BadRequest().json("Malformed upload");
            }
        };
        let content_disposition = field.content_disposition();
        if content_disposition.get_name().unwrap_or("") != "file" {
            continue;
        }
        let original_name = content_disposition
            .get_filename()
            .unwrap_or("articles.csv")
            .to_string();

        let file_path = upload_dir.join(format!("{}.{}", job_id, upload_extension(&original_name)));
        let mut f = match std::fs::File::create(&file_path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("Could not create {:?}: {}", file_path, e);
                return HttpResponse::InternalServerError().json("Could not store the upload");
            }
        };
        while let Some(chunk) = field.next().await {
            let written = match chunk {
                Ok(bytes) => f.write_all(&bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = written {
                log::error!("Upload of {} interrupted: {}", original_name, e);
                discard_upload(&file_path);
                return HttpResponse::BadRequest().json("Upload interrupted");
            }
        }
        saved = Some((file_path, original_name));
    }

    let Some((file_path, original_name)) = saved else {
        return HttpResponse::BadRequest().json("Missing 'file' field");
    };

    data.job_manager.start_job(job_id.clone(), original_name, file_path);

    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "job_id": job_id,
        "message": "File uploaded and job queued."
    }))
}

#[get("/api/status/{job_id}")]
async fn get_status(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    match data.job_manager.status(&path.into_inner()) {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().json("Job not found"),
    }
}

#[get("/api/download/{job_id}")]
async fn download_result(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let Some((output_path, download_name)) = data.job_manager.download(&path.into_inner()) else {
        return HttpResponse::NotFound().body("Result file not generated yet.");
    };

    match std::fs::read(&output_path) {
        Ok(content) => HttpResponse::Ok()
            .content_type("text/tab-separated-values; charset=utf-8")
            .append_header(("Content-Disposition", format!("attachment; filename=\"{}\"", download_name)))
            .body(content),
        Err(e) => {
            log::error!("Could not read {:?}: {}", output_path, e);
            HttpResponse::InternalServerError().body("Result file unreadable.")
        }
    }
}

fn control(data: &web::Data<AppState>, job_id: &str, signal: JobSignal, done: &'static str) -> HttpResponse {
    if data.job_manager.send_control(job_id, signal) {
        HttpResponse::Ok().json(done)
    } else {
        HttpResponse::NotFound().json("Job not found")
    }
}

#[post("/api/pause/{job_id}")]
async fn pause_job(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    control(&data, &path.into_inner(), JobSignal::Pause, "Job paused")
}

#[post("/api/resume/{job_id}")]
async fn resume_job(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    control(&data, &path.into_inner(), JobSignal::Resume, "Job resumed")
}

#[post("/api/stop/{job_id}")]
async fn stop_job(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    control(&data, &path.into_inner(), JobSignal::Stop, "Job stopped")
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(search_code)
        .service(upload_file)
        .service(get_status)
        .service(download_result)
        .service(pause_job)
        .service(resume_job)
        .service(stop_job);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logger::init();

    let config = AppConfig::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let lookup = HttpLookupClient::from_config(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let bind_addr = config.bind_addr.clone();

    let lookup: Arc<dyn Lookup> = Arc::new(lookup);
    let job_manager = Arc::new(JobManager::new(config, lookup.clone()));
    let state = web::Data::new(AppState { job_manager, lookup });

    log::info!("Starting Web Server at http://{}", bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes)
            .service(actix_files::Files::new("/", "./frontend/dist").index_file("index.html"))
    })
    .bind(bind_addr)?
    .run()
    .await
}
