use axum::{
    extract::{Extension, Json, Path},
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;

use crate::handler::errors::{ErrorResponse, ServiceError};
use crate::repository::sqlx_impl::PgProgramRepository;
use crate::repository::{Event, Exhibitor, Pass, Speaker};
use crate::services::program_service::{ProgramService, ScheduleDay};

type ProgramServiceType = ProgramService<PgProgramRepository>;

#[derive(Serialize)]
pub struct EventOverview {
    pub event: Event,
    pub passes: Vec<PassView>,
    pub speakers: Vec<Speaker>,
    pub exhibitors: Vec<Exhibitor>,
}

#[derive(Serialize)]
pub struct PassView {
    #[serde(flatten)]
    pub pass: Pass,
    pub remaining: Option<i32>,
    pub sold_out: bool,
}

impl From<Pass> for PassView {
    fn from(pass: Pass) -> Self {
        Self {
            remaining: pass.remaining(),
            sold_out: pass.is_sold_out(),
            pass,
        }
    }
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub event: Event,
    pub days: Vec<ScheduleDay>,
}

pub async fn overview(service: &ProgramServiceType, event: Event) -> anyhow::Result<EventOverview> {
    let (passes, speakers, exhibitors) = tokio::try_join!(
        service.list_passes(event.event_id),
        service.list_speakers(event.event_id),
        service.list_exhibitors(event.event_id),
    )?;
    Ok(EventOverview {
        event,
        passes: passes.into_iter().map(PassView::from).collect(),
        speakers,
        exhibitors,
    })
}

/// GET /api/events/current
pub async fn current_event_api(
    Extension(service): Extension<Arc<ProgramServiceType>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let event = service
        .current_event()
        .await?
        .ok_or_else(|| ServiceError::not_found("no upcoming event"))?;
    Ok(Json(overview(&service, event).await?))
}

/// GET /api/events/:slug
pub async fn event_api(
    Extension(service): Extension<Arc<ProgramServiceType>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let event = service.get_published_event(&slug).await?;
    Ok(Json(overview(&service, event).await?))
}

/// GET /api/events/:slug/schedule
pub async fn schedule_api(
    Extension(service): Extension<Arc<ProgramServiceType>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let event = service.get_published_event(&slug).await?;
    let days = service.schedule(event.event_id).await?;
    Ok(Json(ScheduleResponse { event, days }))
}
