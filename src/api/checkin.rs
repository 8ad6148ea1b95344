use axum::{
    extract::{Extension, Json, Path, Query},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::{ErrorResponse, ServiceError};
use crate::repository::sqlx_impl::{PgCheckinRepository, PgOrderRepository};
use crate::repository::{CheckinCandidate, CheckinKind};
use crate::services::checkin_service::CheckinService;

pub type CheckinServiceType = CheckinService<PgCheckinRepository, PgOrderRepository>;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub event_id: i64,
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<CheckinCandidate>,
}

#[derive(Deserialize)]
pub struct CheckinRequest {
    pub event_id: i64,
    pub kind: CheckinKind,
    pub subject_id: i64,
}

/// GET /api/checkin/search?event_id=..&q=..
pub async fn search_api(
    Extension(service): Extension<Arc<CheckinServiceType>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let results = service.search(params.event_id, &params.q).await?;
    Ok(Json(SearchResponse {
        query: params.q,
        results,
    }))
}

/// POST /api/checkin
pub async fn check_in_api(
    Extension(service): Extension<Arc<CheckinServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CheckinRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let outcome = service
        .check_in(
            payload.event_id,
            payload.kind,
            payload.subject_id,
            Some(user.user_id),
        )
        .await?;
    Ok(Json(outcome))
}

/// DELETE /api/checkin
pub async fn undo_check_in_api(
    Extension(service): Extension<Arc<CheckinServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CheckinRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if !user.is_admin() {
        return Err(ServiceError::forbidden("only admins can undo a check-in").into());
    }
    service
        .undo_check_in(payload.event_id, payload.kind, payload.subject_id)
        .await?;
    Ok(Json(serde_json::json!({ "outcome": "removed" })))
}

/// GET /api/checkin/stats/:event_id
pub async fn stats_api(
    Extension(service): Extension<Arc<CheckinServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(service.stats(event_id).await?))
}
