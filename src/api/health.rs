use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime};

use crate::domain::Role;
use crate::services::jwt_service::JwtService;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealth,
    pub services: ServicesHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub active_connections: Option<i64>,
}

#[derive(Serialize)]
pub struct ServicesHealth {
    pub jwt_service: String,
    pub password_hashing: String,
}

static START_TIME: OnceLock<SystemTime> = OnceLock::new();

pub fn init_health_check() {
    START_TIME.set(SystemTime::now()).ok();
}

fn uptime_seconds() -> u64 {
    let start_time = START_TIME.get().copied().unwrap_or_else(SystemTime::now);
    SystemTime::now()
        .duration_since(start_time)
        .unwrap_or_default()
        .as_secs()
}

// GET /api/health
pub async fn health_check(Extension(pool): Extension<PgPool>) -> impl IntoResponse {
    let db_health = check_database_health(&pool).await;
    let services_health = check_services_health();

    let healthy = db_health.status == "healthy"
        && services_health.jwt_service == "healthy"
        && services_health.password_hashing == "healthy";

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
        database: db_health,
        services: services_health,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

// GET /api/health/ready
pub async fn readiness_check(Extension(pool): Extension<PgPool>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "timestamp": Utc::now().to_rfc3339()
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "timestamp": Utc::now().to_rfc3339(),
                    "error": "database_connection_failed"
                })),
            )
        }
    }
}

// GET /api/health/live
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": uptime_seconds()
        })),
    )
}

async fn check_database_health(pool: &PgPool) -> DatabaseHealth {
    let start = Instant::now();

    let query_result = sqlx::query(
        "SELECT count(*) AS connection_count FROM pg_stat_activity WHERE state = 'active'",
    )
    .fetch_one(pool)
    .await;

    let response_time = start.elapsed().as_millis() as u64;

    match query_result {
        Ok(row) => DatabaseHealth {
            status: "healthy".to_string(),
            response_time_ms: Some(response_time),
            active_connections: row.try_get("connection_count").ok(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            DatabaseHealth {
                status: "unhealthy".to_string(),
                response_time_ms: Some(response_time),
                active_connections: None,
            }
        }
    }
}

fn check_services_health() -> ServicesHealth {
    let status = |ok: bool| if ok { "healthy" } else { "unhealthy" }.to_string();

    ServicesHealth {
        jwt_service: status(probe_jwt_service().is_ok()),
        password_hashing: status(probe_password_hashing().is_ok()),
    }
}

pub fn probe_jwt_service() -> anyhow::Result<()> {
    let jwt_service = JwtService::new("health_probe_secret");
    let token = jwt_service.generate_token(1, "probe@confhub.local", "probe", Role::Attendee)?;
    jwt_service.verify_token(&token)?;
    Ok(())
}

pub fn probe_password_hashing() -> anyhow::Result<()> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use password_hash::{PasswordHash, PasswordVerifier};
    use rand::thread_rng;

    let password = "probe_password";
    let salt = SaltString::generate(thread_rng());
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash error: {}", e))?
        .to_string();
    let parsed_hash =
        PasswordHash::new(&hash).map_err(|e| anyhow::anyhow!("password parse error: {}", e))?;
    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|e| anyhow::anyhow!("password verify error: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes_pass() {
        assert!(probe_jwt_service().is_ok());
        assert!(probe_password_hashing().is_ok());
        assert_eq!(check_services_health().jwt_service, "healthy");
    }

    #[tokio::test]
    async fn test_liveness_is_always_ok() {
        init_health_check();
        let response = liveness_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
