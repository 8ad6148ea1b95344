use axum::{
    extract::{Extension, Form, Query},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tera::Tera;

use crate::api::checkin::CheckinServiceType;
use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::{page_error, public_message, render_error_page, status_for};
use crate::repository::CheckinKind;
use crate::repository::sqlx_impl::PgProgramRepository;
use crate::services::checkin_service::CheckinOutcome;
use crate::services::program_service::ProgramService;
use crate::views::{CurrentUser, page_context, render_with_status};

type ProgramServiceType = ProgramService<PgProgramRepository>;

#[derive(Deserialize)]
pub struct CheckinPageQuery {
    pub event_id: Option<i64>,
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct CheckinForm {
    pub event_id: i64,
    pub kind: CheckinKind,
    pub subject_id: i64,
    #[serde(default)]
    pub q: String,
}

struct Flash {
    status: StatusCode,
    message: String,
    ok: bool,
}

async fn render_desk(
    program: &ProgramServiceType,
    checkin: &CheckinServiceType,
    tmpl: &Tera,
    user: &CurrentUser,
    event_id: Option<i64>,
    query: &str,
    flash: Option<Flash>,
) -> Response {
    let event = match event_id {
        Some(id) => program.get_event(id).await.map(Some),
        None => program.current_event().await,
    };
    let event = match event {
        Ok(Some(event)) => event,
        Ok(None) => {
            return render_error_page(tmpl, StatusCode::NOT_FOUND, "No event to check in for");
        }
        Err(e) => return page_error(tmpl, &e),
    };

    let (results, stats) = match tokio::try_join!(
        checkin.search(event.event_id, query),
        checkin.stats(event.event_id)
    ) {
        Ok(loaded) => loaded,
        Err(e) => return page_error(tmpl, &e),
    };

    let mut ctx = page_context("Check-in", user);
    ctx.insert("event", &event);
    ctx.insert("q", query);
    ctx.insert("results", &results);
    ctx.insert("stats", &stats);

    let status = match flash {
        Some(flash) => {
            ctx.insert("flash", &flash.message);
            ctx.insert("flash_ok", &flash.ok);
            flash.status
        }
        None => StatusCode::OK,
    };
    render_with_status(tmpl, status, "checkin.html", &ctx)
}

// GET /checkin?q=diop
pub async fn checkin_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(checkin): Extension<Arc<CheckinServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<CheckinPageQuery>,
) -> Response {
    render_desk(&program, &checkin, &tmpl, &user, params.event_id, &params.q, None).await
}

// POST /checkin
pub async fn checkin_post(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(checkin): Extension<Arc<CheckinServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Extension(staff): Extension<AuthenticatedUser>,
    user: CurrentUser,
    Form(form): Form<CheckinForm>,
) -> Response {
    let result = checkin
        .check_in(form.event_id, form.kind, form.subject_id, Some(staff.user_id))
        .await;

    let flash = match result {
        Ok(CheckinOutcome::CheckedIn { checked_in_at }) => Flash {
            status: StatusCode::OK,
            message: format!("Checked in at {}", checked_in_at.format("%H:%M")),
            ok: true,
        },
        Ok(CheckinOutcome::AlreadyCheckedIn { checked_in_at }) => Flash {
            status: StatusCode::OK,
            message: format!(
                "Already checked in at {}",
                checked_in_at.format("%d/%m %H:%M")
            ),
            ok: false,
        },
        Err(e) if status_for(&e) != StatusCode::INTERNAL_SERVER_ERROR => Flash {
            status: status_for(&e),
            message: public_message(&e),
            ok: false,
        },
        Err(e) => return page_error(&tmpl, &e),
    };

    render_desk(
        &program,
        &checkin,
        &tmpl,
        &user,
        Some(form.event_id),
        &form.q,
        Some(flash),
    )
    .await
}
