use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;
use tera::Tera;
use uuid::Uuid;

/// Failures a service can raise on purpose.
///
/// Services return `anyhow::Result`; handlers downcast to this type to choose
/// the HTTP status. Anything else is an internal error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> anyhow::Error {
        ServiceError::NotFound(what.into()).into()
    }

    pub fn conflict(message: impl Into<String>) -> anyhow::Error {
        ServiceError::Conflict(message.into()).into()
    }

    pub fn validation(message: impl Into<String>) -> anyhow::Error {
        ServiceError::Validation(message.into()).into()
    }

    pub fn unauthorized(message: impl Into<String>) -> anyhow::Error {
        ServiceError::Unauthorized(message.into()).into()
    }

    pub fn forbidden(message: impl Into<String>) -> anyhow::Error {
        ServiceError::Forbidden(message.into()).into()
    }

    pub fn gateway(message: impl Into<String>) -> anyhow::Error {
        ServiceError::Gateway(message.into()).into()
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Status an arbitrary service error maps to.
pub fn status_for(err: &anyhow::Error) -> StatusCode {
    err.downcast_ref::<ServiceError>()
        .map(ServiceError::status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Message safe to show to a client for an arbitrary service error.
pub fn public_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ServiceError>() {
        Some(service_error) => service_error.to_string(),
        None => "An internal error occurred".to_string(),
    }
}

/// JSON error body returned by every `/api` route
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: message.into(),
            status_code: status.as_u16(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Maps a service error, logging the details of anything unexpected.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let status = status_for(err);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let error_id = Uuid::new_v4();
            tracing::error!(error_id = %error_id, error = ?err, "Unhandled service error");
        } else if status == StatusCode::BAD_GATEWAY {
            tracing::warn!(error = %err, "Payment gateway failure");
        }
        Self::new(status, public_message(err))
    }
}

impl From<anyhow::Error> for ErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(&err)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Renders `errors/<code>.html`, falling back to plain text when the template
/// itself is broken.
pub fn render_error_page(tmpl: &Tera, status: StatusCode, message: &str) -> Response {
    let template = match status.as_u16() {
        403 => "errors/403.html",
        404 => "errors/404.html",
        400..=499 => "errors/400.html",
        503 => "errors/503.html",
        _ => "errors/500.html",
    };

    let mut ctx = tera::Context::new();
    ctx.insert(
        "title",
        &format!(
            "{} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        ),
    );
    ctx.insert("error_message", message);

    match tmpl.render(template, &ctx) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render {} template: {}", template, e);
            (status, message.to_string()).into_response()
        }
    }
}

/// Error page for a service error raised while rendering a page.
pub fn page_error(tmpl: &Tera, err: &anyhow::Error) -> Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = ?err, "Page handler failed");
    }
    render_error_page(tmpl, status, &public_message(err))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

fn is_api_route(path: &str) -> bool {
    path.starts_with("/api/")
}

/// Router fallback: JSON for API clients, the HTML page for browsers.
pub async fn handler_404(Extension(tmpl): Extension<Tera>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    tracing::warn!("404 Not Found: {}", path);

    if is_api_route(&path) || wants_json(req.headers()) {
        return ErrorResponse::not_found("The requested resource was not found").into_response();
    }

    render_error_page(&tmpl, StatusCode::NOT_FOUND, &path)
}
