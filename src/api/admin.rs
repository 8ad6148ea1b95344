use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Role;
use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::ErrorResponse;
use crate::repository::sqlx_impl::{
    PgBlogRepository, PgCheckinRepository, PgOrderRepository, PgPasswordResetRepository,
    PgProgramRepository, PgUserRepository,
};
use crate::repository::{
    Event, ExhibitorInput, OrderStatus, PassInput, SalesSummary, SessionInput, SpeakerInput,
    VisitorInput,
};
use crate::services::blog_service::{BlogService, PostForm};
use crate::services::checkin_service::{CheckinService, CheckinStats};
use crate::services::order_service::OrderService;
use crate::services::program_service::{EventForm, ProgramService};
use crate::services::user_service::{CreateUserRequest, UserService};

type UserServiceType = UserService<PgUserRepository, PgPasswordResetRepository>;
type ProgramServiceType = ProgramService<PgProgramRepository>;
type OrderServiceType = OrderService<PgOrderRepository, PgProgramRepository>;
type CheckinServiceType = CheckinService<PgCheckinRepository, PgOrderRepository>;
type BlogServiceType = BlogService<PgBlogRepository>;

#[derive(Serialize)]
pub struct AdminDashboard {
    pub total_users: i64,
    pub event: Option<Event>,
    pub sales: SalesSummary,
    pub checkins: Option<CheckinStats>,
    pub current_admin: AuthenticatedUser,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct UserPage<T: Serialize> {
    pub users: Vec<T>,
    pub total: i64,
    pub page: i64,
}

fn first_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

fn deleted() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ============= Dashboard =============

// GET /api/admin/dashboard
pub async fn admin_dashboard(
    Extension(user): Extension<AuthenticatedUser>,
    Extension(users): Extension<Arc<UserServiceType>>,
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(checkin): Extension<Arc<CheckinServiceType>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let (_, total_users) = users.list_users(1, 1).await?;
    let event = program.current_event().await?;

    let (sales, checkins) = match &event {
        Some(event) => (
            orders.sales_summary(event.event_id).await?,
            Some(checkin.stats(event.event_id).await?),
        ),
        None => (SalesSummary::default(), None),
    };

    Ok(Json(AdminDashboard {
        total_users,
        event,
        sales,
        checkins,
        current_admin: user,
    }))
}

// ============= Events =============

pub async fn list_events(
    Extension(program): Extension<Arc<ProgramServiceType>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_events(true).await?))
}

pub async fn create_event(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(form): Json<EventForm>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.create_event(form).await?)))
}

pub async fn update_event(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
    Json(form): Json<EventForm>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_event(event_id, form).await?))
}

pub async fn delete_event(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_event(event_id).await?;
    Ok(deleted())
}

// ============= Passes =============

pub async fn list_passes(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_passes(event_id).await?))
}

pub async fn create_pass(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(input): Json<PassInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.create_pass(input).await?)))
}

pub async fn update_pass(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(pass_id): Path<i64>,
    Json(input): Json<PassInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_pass(pass_id, input).await?))
}

pub async fn delete_pass(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(pass_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_pass(pass_id).await?;
    Ok(deleted())
}

// ============= Sessions =============

pub async fn list_sessions(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_sessions(event_id).await?))
}

pub async fn create_session(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(input): Json<SessionInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.create_session(input).await?)))
}

pub async fn update_session(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(session_id): Path<i64>,
    Json(input): Json<SessionInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_session(session_id, input).await?))
}

pub async fn delete_session(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_session(session_id).await?;
    Ok(deleted())
}

// ============= Speakers =============

pub async fn list_speakers(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_speakers(event_id).await?))
}

pub async fn create_speaker(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(input): Json<SpeakerInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.create_speaker(input).await?)))
}

pub async fn update_speaker(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(speaker_id): Path<i64>,
    Json(input): Json<SpeakerInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_speaker(speaker_id, input).await?))
}

pub async fn delete_speaker(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(speaker_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_speaker(speaker_id).await?;
    Ok(deleted())
}

// ============= Exhibitors =============

pub async fn list_exhibitors(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_exhibitors(event_id).await?))
}

pub async fn create_exhibitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(input): Json<ExhibitorInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.create_exhibitor(input).await?)))
}

pub async fn update_exhibitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(exhibitor_id): Path<i64>,
    Json(input): Json<ExhibitorInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_exhibitor(exhibitor_id, input).await?))
}

pub async fn delete_exhibitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(exhibitor_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_exhibitor(exhibitor_id).await?;
    Ok(deleted())
}

// ============= Visitors =============

pub async fn list_visitors(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.list_visitors(event_id).await?))
}

pub async fn create_visitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Json(input): Json<VisitorInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok((StatusCode::CREATED, Json(program.register_visitor(input).await?)))
}

pub async fn update_visitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(visitor_id): Path<i64>,
    Json(input): Json<VisitorInput>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(program.update_visitor(visitor_id, input).await?))
}

pub async fn delete_visitor(
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Path(visitor_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    program.delete_visitor(visitor_id).await?;
    Ok(deleted())
}

// ============= Blog =============

pub async fn list_posts(
    Extension(blog): Extension<Arc<BlogServiceType>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(blog.list_all().await?))
}

pub async fn create_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(form): Json<PostForm>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let post = blog.create_post(form, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Path(post_id): Path<i64>,
    Json(form): Json<PostForm>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(blog.update_post(post_id, form).await?))
}

pub async fn delete_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    blog.delete_post(post_id).await?;
    Ok(deleted())
}

pub async fn publish_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(blog.publish(post_id).await?))
}

pub async fn unpublish_post(
    Extension(blog): Extension<Arc<BlogServiceType>>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(blog.unpublish(post_id).await?))
}

// ============= Users =============

// GET /api/admin/users
pub async fn list_users(
    Extension(users): Extension<Arc<UserServiceType>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let (page, total) = users.list_users(query.page, query.per_page).await?;
    Ok(Json(UserPage {
        users: page,
        total,
        page: query.page.max(1),
    }))
}

// POST /api/admin/users
pub async fn create_user(
    Extension(users): Extension<Arc<UserServiceType>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let user = users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// PUT /api/admin/users/:id/role
pub async fn set_user_role(
    Extension(users): Extension<Arc<UserServiceType>>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    users.set_role(admin.user_id, user_id, payload.role).await?;
    Ok(Json(users.get_user(user_id).await?))
}

// ============= Orders =============

// GET /api/admin/orders
pub async fn list_orders(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(
        orders
            .list_orders(query.status, query.page, query.per_page)
            .await?,
    ))
}

// GET /api/admin/orders/:external_id
pub async fn get_order(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Path(external_id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(orders.get_order(external_id).await?))
}

// POST /api/admin/orders/:external_id/cancel
pub async fn cancel_order(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Path(external_id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    orders.cancel_order(external_id).await?;
    Ok(Json(orders.get_order(external_id).await?))
}

// POST /api/admin/orders/:external_id/reconcile
pub async fn reconcile_order(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Path(external_id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(orders.reconcile(external_id).await?))
}
