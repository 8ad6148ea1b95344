use axum::{
    extract::{Extension, Form, Path, Query},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tera::Tera;

use crate::api::events::{PassView, overview};
use crate::handler::errors::{page_error, public_message, render_error_page, status_for};
use crate::repository::sqlx_impl::{PgBlogRepository, PgProgramRepository};
use crate::repository::{Event, VisitorInput};
use crate::services::blog_service::BlogService;
use crate::services::program_service::ProgramService;
use crate::views::{CurrentUser, page_context, render, render_with_status};

type ProgramServiceType = ProgramService<PgProgramRepository>;
type BlogServiceType = BlogService<PgBlogRepository>;

const HOME_POSTS: usize = 3;

#[derive(Deserialize)]
pub struct BlogQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VisitForm {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

async fn require_current_event(
    program: &ProgramServiceType,
    tmpl: &Tera,
) -> Result<Event, Response> {
    match program.current_event().await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(render_error_page(
            tmpl,
            StatusCode::NOT_FOUND,
            "No upcoming event has been announced yet",
        )),
        Err(e) => Err(page_error(tmpl, &e)),
    }
}

// GET /
pub async fn home_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let mut ctx = page_context("Home", &user);

    match program.current_event().await {
        Ok(Some(event)) => match overview(&program, event).await {
            Ok(overview) => ctx.insert("overview", &overview),
            Err(e) => return page_error(&tmpl, &e),
        },
        Ok(None) => {}
        Err(e) => return page_error(&tmpl, &e),
    }

    match blog.list_published(1).await {
        Ok(page) => {
            let latest: Vec<_> = page.posts.into_iter().take(HOME_POSTS).collect();
            ctx.insert("latest_posts", &latest);
        }
        Err(e) => return page_error(&tmpl, &e),
    }

    render(&tmpl, "index.html", &ctx)
}

// GET /schedule
pub async fn schedule_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let event = match require_current_event(&program, &tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    match program.schedule(event.event_id).await {
        Ok(days) => {
            let mut ctx = page_context("Schedule", &user);
            ctx.insert("event", &event);
            ctx.insert("days", &days);
            render(&tmpl, "schedule.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /speakers
pub async fn speakers_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let event = match require_current_event(&program, &tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    match program.list_speakers(event.event_id).await {
        Ok(speakers) => {
            let mut ctx = page_context("Speakers", &user);
            ctx.insert("event", &event);
            ctx.insert("speakers", &speakers);
            render(&tmpl, "speakers.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /exhibitors
pub async fn exhibitors_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let event = match require_current_event(&program, &tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    match program.list_exhibitors(event.event_id).await {
        Ok(exhibitors) => {
            let mut ctx = page_context("Exhibitors", &user);
            ctx.insert("event", &event);
            ctx.insert("exhibitors", &exhibitors);
            render(&tmpl, "exhibitors.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

/// Ticket shop. Also re-rendered by the checkout handler when an order is
/// refused, with `error` set and the form values kept.
pub async fn render_tickets(
    program: &ProgramServiceType,
    tmpl: &Tera,
    user: &CurrentUser,
    status: StatusCode,
    error: Option<&str>,
    form: Option<&HashMap<String, String>>,
) -> Response {
    let event = match require_current_event(program, tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    let passes = match program.list_passes(event.event_id).await {
        Ok(passes) => passes,
        Err(e) => return page_error(tmpl, &e),
    };
    let passes: Vec<PassView> = passes
        .into_iter()
        .filter(|p| p.sales_open)
        .map(PassView::from)
        .collect();

    let mut ctx = page_context("Tickets", user);
    ctx.insert("event", &event);
    ctx.insert("passes", &passes);
    if let Some(error) = error {
        ctx.insert("error", error);
    }
    if let Some(form) = form {
        ctx.insert("form", form);
    } else if let Some(Extension(u)) = user {
        let mut prefill = HashMap::new();
        prefill.insert("buyer_email".to_string(), u.email.clone());
        ctx.insert("form", &prefill);
    }
    render_with_status(tmpl, status, "tickets.html", &ctx)
}

// GET /tickets
pub async fn tickets_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    render_tickets(&program, &tmpl, &user, StatusCode::OK, None, None).await
}

// GET /blog
pub async fn blog_list_page(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<BlogQuery>,
) -> Response {
    match blog.list_published(params.page.unwrap_or(1)).await {
        Ok(page) => {
            let mut ctx = page_context("Blog", &user);
            ctx.insert("posts", &page.posts);
            ctx.insert("page", &page.page);
            ctx.insert("total_pages", &page.total_pages);
            render(&tmpl, "blog_list.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /blog/:slug
pub async fn blog_post_page(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Path(slug): Path<String>,
) -> Response {
    match blog.get_published_by_slug(&slug).await {
        Ok(post) => {
            let mut ctx = page_context(&post.title, &user);
            ctx.insert("post", &post);
            render(&tmpl, "blog_post.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /register-visit
pub async fn register_visit_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let event = match require_current_event(&program, &tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    let mut ctx = page_context("Visitor registration", &user);
    ctx.insert("event", &event);
    render(&tmpl, "register_visit.html", &ctx)
}

// POST /register-visit
pub async fn register_visit_post(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(form): Form<VisitForm>,
) -> Response {
    let event = match require_current_event(&program, &tmpl).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    let input = VisitorInput {
        event_id: event.event_id,
        full_name: form.full_name.clone(),
        email: form.email.clone(),
        phone: form.phone.clone(),
        company: form.company.clone(),
    };

    let mut ctx = page_context("Visitor registration", &user);
    ctx.insert("event", &event);

    match program.register_visitor(input).await {
        Ok(visitor) => {
            tracing::info!(
                visitor_id = visitor.visitor_id,
                event_id = event.event_id,
                "visitor registered"
            );
            ctx.insert("visitor", &visitor);
            render(&tmpl, "register_visit.html", &ctx)
        }
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                return page_error(&tmpl, &e);
            }
            ctx.insert("error", &public_message(&e));
            ctx.insert("form_full_name", &form.full_name);
            ctx.insert("form_email", &form.email);
            ctx.insert("form_phone", &form.phone);
            ctx.insert("form_company", &form.company);
            render_with_status(&tmpl, status, "register_visit.html", &ctx)
        }
    }
}
