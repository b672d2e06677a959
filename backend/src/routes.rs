use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError};
use ergot_shared::{Label, Language};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::prediction::{PredictionError, PredictionService, UploadedImage};
use crate::views::{RenderContext, Renderer, View};

pub const LANG_COOKIE: &str = "lang";
const FILE_FIELD: &str = "file";

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/about_ergot").route(web::get().to(about_ergot)))
        .service(web::resource("/identify").route(web::get().to(identify)))
        .service(web::resource("/faq").route(web::get().to(faq)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/language/{code}").route(web::get().to(set_language)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(Files::new("/static", static_dir));
}

impl ResponseError for PredictionError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::NoFile
            | PredictionError::InvalidImage(_)
            | PredictionError::Malformed(_) => StatusCode::BAD_REQUEST,
            PredictionError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictionError::Storage(_)
            | PredictionError::Inference(_)
            | PredictionError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            PredictionError::InvalidImage(_) => "Uploaded file is not a valid image".to_string(),
            PredictionError::Storage(_)
            | PredictionError::Inference(_)
            | PredictionError::Blocking(_) => "Prediction failed".to_string(),
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse { error })
    }
}

fn request_language(req: &HttpRequest, renderer: &Renderer) -> Language {
    req.cookie(LANG_COOKIE)
        .and_then(|c| Language::from_str(c.value()).ok())
        .unwrap_or_else(|| renderer.default_language())
}

fn page(req: &HttpRequest, renderer: &Renderer, view: View) -> HttpResponse {
    renderer.respond(view, request_language(req, renderer), &RenderContext::new())
}

async fn home(req: HttpRequest, renderer: web::Data<Renderer>) -> HttpResponse {
    page(&req, &renderer, View::Home)
}

async fn about_ergot(req: HttpRequest, renderer: web::Data<Renderer>) -> HttpResponse {
    page(&req, &renderer, View::AboutErgot)
}

async fn identify(req: HttpRequest, renderer: web::Data<Renderer>) -> HttpResponse {
    page(&req, &renderer, View::Identify)
}

async fn faq(req: HttpRequest, renderer: web::Data<Renderer>) -> HttpResponse {
    page(&req, &renderer, View::Faq)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn predict(
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<PredictionService>,
    renderer: web::Data<Renderer>,
) -> Result<HttpResponse, PredictionError> {
    if !req.content_type().eq_ignore_ascii_case("multipart/form-data") {
        warn!("Rejected /predict without multipart body");
        return Err(PredictionError::NoFile);
    }

    let multipart = Multipart::new(req.headers(), payload);
    let upload = match read_file_part(multipart, service.store().max_size()).await? {
        Some(upload) if !upload.is_blank() => upload,
        _ => {
            warn!("Rejected /predict without a file part");
            return Err(PredictionError::NoFile);
        }
    };

    let worker = service.clone();
    let result = web::block(move || worker.handle_upload(upload))
        .await
        .map_err(|e| PredictionError::Blocking(e.to_string()))?
        .inspect_err(|e| {
            if e.status_code().is_server_error() {
                error!("Prediction failed: {}", e);
            }
        })?;

    let lang = request_language(&req, &renderer);
    let (view, label_key) = match result.label {
        Label::Diseased => (View::ErgotDetected, "label.diseased"),
        Label::Healthy => (View::ResultHealthy, "label.healthy"),
    };
    let ctx = RenderContext::new()
        .with("result", renderer.catalog().text(lang, label_key))
        .with("confidence", format!("{:.2}", result.confidence_percent))
        .with("image_url", service.store().public_url(&result.filename))
        .with("filename", result.filename);
    Ok(renderer.respond(view, lang, &ctx))
}

/// Collects the first `file` part, skipping every other field.
async fn read_file_part(
    mut payload: Multipart,
    max_size: usize,
) -> Result<Option<UploadedImage>, PredictionError> {
    let mut upload = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| PredictionError::Malformed(e.to_string()))?
    {
        let disposition = field.content_disposition();
        let name = disposition.and_then(|cd| cd.get_name()).map(str::to_owned);
        let filename = disposition
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);
        let content_type = field.content_type().map(|m| m.essence_str().to_owned());

        if name.as_deref() != Some(FILE_FIELD) || upload.is_some() {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| PredictionError::Malformed(e.to_string()))?;
            }
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| PredictionError::Malformed(e.to_string()))?;
            if data.len() + chunk.len() > max_size {
                warn!("Upload exceeded {} bytes", max_size);
                return Err(PredictionError::UploadTooLarge {
                    size: data.len() + chunk.len(),
                    max: max_size,
                });
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(UploadedImage {
            filename: filename.unwrap_or_default(),
            content_type,
            data,
        });
    }

    Ok(upload)
}

async fn set_language(req: HttpRequest, path: web::Path<String>) -> HttpResponse {
    let code = path.into_inner();
    let mut response = HttpResponse::SeeOther();
    response.insert_header((header::LOCATION, redirect_target(&req)));

    match Language::from_str(&code) {
        Ok(lang) => {
            info!("Switching language to {}", lang);
            response.cookie(
                Cookie::build(LANG_COOKIE, lang.to_string())
                    .path("/")
                    .same_site(SameSite::Lax)
                    .max_age(Duration::days(365))
                    .finish(),
            );
        }
        Err(_) => warn!("Unsupported language code: {}", code),
    }

    response.finish()
}

/// Path of the referring page, or `/`. Never redirects off-site.
fn redirect_target(req: &HttpRequest) -> String {
    let referer = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| url::Url::parse(v).ok());

    match referer {
        Some(url) => match url.path() {
            "/predict" => "/identify".to_string(),
            p if p.starts_with("/language/") => "/".to_string(),
            p => match url.query() {
                Some(q) => format!("{}?{}", p, q),
                None => p.to_string(),
            },
        },
        None => "/".to_string(),
    }
}
