//! Back-office pages. Every route here sits behind `require_admin`.

use axum::{
    extract::{Extension, Form, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tera::Tera;
use uuid::Uuid;

use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::{page_error, public_message, status_for};
use crate::repository::sqlx_impl::{
    PgBlogRepository, PgCheckinRepository, PgOrderRepository, PgPasswordResetRepository,
    PgProgramRepository, PgUserRepository,
};
use crate::repository::{Event, OrderStatus, SalesSummary, SpeakerInput};
use crate::services::blog_service::{BlogService, PostForm};
use crate::services::checkin_service::CheckinService;
use crate::services::order_service::OrderService;
use crate::services::program_service::ProgramService;
use crate::services::user_service::UserService;
use crate::views::{CurrentUser, page_context, render, render_with_status};

type UserServiceType = UserService<PgUserRepository, PgPasswordResetRepository>;
type ProgramServiceType = ProgramService<PgProgramRepository>;
type OrderServiceType = OrderService<PgOrderRepository, PgProgramRepository>;
type CheckinServiceType = CheckinService<PgCheckinRepository, PgOrderRepository>;
type BlogServiceType = BlogService<PgBlogRepository>;

const ORDERS_PER_PAGE: i64 = 50;

#[derive(Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
    pub page: Option<i64>,
}

#[derive(Deserialize)]
pub struct SpeakerForm {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Blank `status` means every order.
pub fn parse_status_filter(raw: Option<&str>) -> Option<OrderStatus> {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| s.parse().ok())
}

// GET /admin
pub async fn dashboard_page(
    Extension(users): Extension<Arc<UserServiceType>>,
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(checkin): Extension<Arc<CheckinServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let result = async {
        let (_, total_users) = users.list_users(1, 1).await?;
        let event = program.current_event().await?;
        let (sales, stats) = match &event {
            Some(event) => (
                orders.sales_summary(event.event_id).await?,
                Some(checkin.stats(event.event_id).await?),
            ),
            None => (SalesSummary::default(), None),
        };
        Ok::<_, anyhow::Error>((total_users, event, sales, stats))
    }
    .await;

    match result {
        Ok((total_users, event, sales, stats)) => {
            let mut ctx = page_context("Back-office", &user);
            ctx.insert("total_users", &total_users);
            ctx.insert("event", &event);
            ctx.insert("sales", &sales);
            ctx.insert("checkin_stats", &stats);
            render(&tmpl, "admin/dashboard.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /admin/orders?status=paid&page=2
pub async fn orders_page(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<OrdersQuery>,
) -> Response {
    let status = parse_status_filter(params.status.as_deref());
    let page = params.page.unwrap_or(1).max(1);

    match orders.list_orders(status, page, ORDERS_PER_PAGE).await {
        Ok(list) => {
            let mut ctx = page_context("Orders", &user);
            ctx.insert("has_next", &(list.len() as i64 == ORDERS_PER_PAGE));
            ctx.insert("orders", &list);
            ctx.insert("status", &status.map(|s| s.to_string()));
            ctx.insert("page", &page);
            render(&tmpl, "admin/orders.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/orders/:external_id/cancel
pub async fn cancel_order_post(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(external_id): Path<Uuid>,
) -> Response {
    match orders.cancel_order(external_id).await {
        Ok(()) => Redirect::to("/admin/orders").into_response(),
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/orders/:external_id/reconcile
pub async fn reconcile_order_post(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(external_id): Path<Uuid>,
) -> Response {
    match orders.reconcile(external_id).await {
        Ok(outcome) => {
            tracing::info!(external_id = %external_id, outcome = ?outcome, "order reconciled");
            Redirect::to("/admin/orders").into_response()
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

async fn speakers_context(
    program: &ProgramServiceType,
    user: &CurrentUser,
) -> anyhow::Result<(tera::Context, Option<Event>)> {
    let mut ctx = page_context("Speakers", user);
    let event = program.current_event().await?;
    if let Some(event) = &event {
        ctx.insert("event", event);
        ctx.insert("speakers", &program.list_speakers(event.event_id).await?);
    }
    Ok((ctx, event))
}

// GET /admin/speakers
pub async fn speakers_page(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    match speakers_context(&program, &user).await {
        Ok((ctx, _)) => render(&tmpl, "admin/speakers.html", &ctx),
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/speakers
pub async fn create_speaker_post(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(form): Form<SpeakerForm>,
) -> Response {
    let (mut ctx, event) = match speakers_context(&program, &user).await {
        Ok(loaded) => loaded,
        Err(e) => return page_error(&tmpl, &e),
    };
    let Some(event) = event else {
        ctx.insert("error", "Create an event before adding speakers");
        return render_with_status(&tmpl, StatusCode::BAD_REQUEST, "admin/speakers.html", &ctx);
    };

    let input = SpeakerInput {
        event_id: event.event_id,
        full_name: form.full_name,
        email: form.email,
        company: form.company,
        job_title: form.job_title,
        bio: form.bio,
        photo_url: form.photo_url,
    };

    match program.create_speaker(input).await {
        Ok(_) => Redirect::to("/admin/speakers").into_response(),
        Err(e) if status_for(&e) != StatusCode::INTERNAL_SERVER_ERROR => {
            ctx.insert("error", &public_message(&e));
            render_with_status(&tmpl, status_for(&e), "admin/speakers.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/speakers/:id/delete
pub async fn delete_speaker_post(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(speaker_id): Path<i64>,
) -> Response {
    match program.delete_speaker(speaker_id).await {
        Ok(()) => Redirect::to("/admin/speakers").into_response(),
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /admin/posts
pub async fn posts_page(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    match blog.list_all().await {
        Ok(posts) => {
            let mut ctx = page_context("Posts", &user);
            ctx.insert("posts", &posts);
            render(&tmpl, "admin/posts.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /admin/posts/new
pub async fn new_post_page(Extension(tmpl): Extension<Tera>, user: CurrentUser) -> Response {
    let mut ctx = page_context("New post", &user);
    ctx.insert("action", "/admin/posts/new");
    render(&tmpl, "admin/post_form.html", &ctx)
}

fn post_form_error(
    tmpl: &Tera,
    user: &CurrentUser,
    action: &str,
    form: &PostForm,
    err: &anyhow::Error,
) -> Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return page_error(tmpl, err);
    }
    let mut ctx = page_context("Edit post", user);
    ctx.insert("action", action);
    ctx.insert("error", &public_message(err));
    ctx.insert("form_title", &form.title);
    ctx.insert("form_slug", &form.slug);
    ctx.insert("form_excerpt", &form.excerpt);
    ctx.insert("form_body", &form.body);
    render_with_status(tmpl, status, "admin/post_form.html", &ctx)
}

// POST /admin/posts/new
pub async fn create_post_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Extension(admin): Extension<AuthenticatedUser>,
    user: CurrentUser,
    Form(form): Form<PostForm>,
) -> Response {
    match blog.create_post(form.clone(), Some(admin.user_id)).await {
        Ok(post) => Redirect::to(&format!("/admin/posts/{}/edit", post.post_id)).into_response(),
        Err(e) => post_form_error(&tmpl, &user, "/admin/posts/new", &form, &e),
    }
}

// GET /admin/posts/:id/edit
pub async fn edit_post_page(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
) -> Response {
    match blog.get_post(post_id).await {
        Ok(post) => {
            let mut ctx = page_context("Edit post", &user);
            ctx.insert("action", &format!("/admin/posts/{}/edit", post.post_id));
            ctx.insert("form_title", &post.title);
            ctx.insert("form_slug", &post.slug);
            ctx.insert("form_excerpt", &post.excerpt);
            ctx.insert("form_body", &post.body);
            ctx.insert("post", &post);
            render(&tmpl, "admin/post_form.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/posts/:id/edit
pub async fn update_post_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    Form(form): Form<PostForm>,
) -> Response {
    let action = format!("/admin/posts/{}/edit", post_id);
    match blog.update_post(post_id, form.clone()).await {
        Ok(_) => Redirect::to(&action).into_response(),
        Err(e) => post_form_error(&tmpl, &user, &action, &form, &e),
    }
}

// POST /admin/posts/:id/publish
pub async fn publish_post_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(post_id): Path<i64>,
) -> Response {
    match blog.publish(post_id).await {
        Ok(_) => Redirect::to("/admin/posts").into_response(),
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/posts/:id/unpublish
pub async fn unpublish_post_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(post_id): Path<i64>,
) -> Response {
    match blog.unpublish(post_id).await {
        Ok(_) => Redirect::to("/admin/posts").into_response(),
        Err(e) => page_error(&tmpl, &e),
    }
}

// POST /admin/posts/:id/delete
pub async fn delete_post_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(tmpl): Extension<Tera>,
    Path(post_id): Path<i64>,
) -> Response {
    match blog.delete_post(post_id).await {
        Ok(()) => Redirect::to("/admin/posts").into_response(),
        Err(e) => page_error(&tmpl, &e),
    }
}
