use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;
use tracing::{Level, debug, error, info, warn};

/// Request fields worth keeping on every access log line
#[derive(Debug)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub content_length: Option<u64>,
}

impl RequestInfo {
    pub fn from_request(req: &Request) -> Self {
        let headers = req.headers();

        Self {
            method: req.method().to_string(),
            uri: req.uri().path().to_string(),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0),
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
            content_length: headers
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Access log middleware.
///
/// Logs once per request after the response is produced. The level follows the
/// status class: 5xx is an error, 4xx a warning, everything else info. Query
/// strings are dropped from the logged URI since checkout and reset links carry
/// tokens there.
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let info = RequestInfo::from_request(&req);

    debug!(method = %info.method, uri = %info.uri, "Incoming request");

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    let remote_addr = info.remote_addr.map(|a| a.to_string());

    match status {
        500..=599 => error!(
            method = %info.method,
            uri = %info.uri,
            status,
            duration_ms,
            remote_addr = ?remote_addr,
            user_agent = ?info.user_agent,
            "Server error occurred"
        ),
        400..=499 => warn!(
            method = %info.method,
            uri = %info.uri,
            status,
            duration_ms,
            remote_addr = ?remote_addr,
            "Client error"
        ),
        300..=399 => info!(
            method = %info.method,
            uri = %info.uri,
            status,
            duration_ms,
            "Request redirected"
        ),
        _ => info!(
            method = %info.method,
            uri = %info.uri,
            status,
            duration_ms,
            content_length = ?info.content_length,
            "Request completed"
        ),
    }

    response
}

/// Config log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// INFO and above
    Info,
    /// Everything down to DEBUG
    Debug,
    /// WARN and ERROR
    Warn,
    /// ERROR only
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn to_filter_string(&self) -> String {
        let level = match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        format!("confhub={level},tower_http={level},sqlx=warn")
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "debug" | "trace" => Ok(LogLevel::Debug),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "critical" => Ok(LogLevel::Error),
            other => anyhow::bail!("unknown log level `{}`", other),
        }
    }
}

/// Initialize logging system with specified level.
///
/// `RUST_LOG` wins over the configured level when present.
pub fn init_logging(log_level: LogLevel) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_string()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .try_init();

    info!("Logging initialized with level: {:?}", log_level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_to_tracing_level() {
        assert_eq!(LogLevel::Info.to_tracing_level(), Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Error.to_tracing_level(), Level::ERROR);
    }

    #[test]
    fn test_log_level_filter_string() {
        assert_eq!(
            LogLevel::Info.to_filter_string(),
            "confhub=info,tower_http=info,sqlx=warn"
        );
        assert_eq!(
            LogLevel::Error.to_filter_string(),
            "confhub=error,tower_http=error,sqlx=warn"
        );
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
