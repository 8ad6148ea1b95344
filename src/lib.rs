pub mod api;
pub mod config;
pub mod domain;
pub mod handler;
pub mod repository;
pub mod services;
pub mod views;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post, put},
};
use sqlx::PgPool;
use tera::Tera;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handler::auth::{
    optional_auth, require_admin, require_auth, require_page_auth, require_staff,
};
use crate::handler::errors::handler_404;
use crate::handler::logging::request_logging_middleware;
use crate::repository::sqlx_impl::{
    PgBlogRepository, PgCheckinRepository, PgOrderRepository, PgPasswordResetRepository,
    PgProgramRepository, PgUserRepository,
};
use crate::services::blog_service::BlogService;
use crate::services::checkin_service::CheckinService;
use crate::services::jwt_service::JwtService;
use crate::services::naboopay::PaymentGateway;
use crate::services::order_service::OrderService;
use crate::services::program_service::ProgramService;
use crate::services::user_service::UserService;

// re-exports for ease
pub use repository::*;
pub use services::*;

/// Builds the full application: JSON API, pages, static files and the 404
/// fallback, with every service wired to the given pool.
pub fn build_router(
    pool: PgPool,
    config: Arc<AppConfig>,
    tera: Tera,
    gateway: Arc<dyn PaymentGateway>,
) -> Router {
    // Initialize repositories
    let user_repo = Arc::new(PgUserRepository::new(pool.clone()));
    let password_reset_repo = Arc::new(PgPasswordResetRepository::new(pool.clone()));
    let program_repo = Arc::new(PgProgramRepository::new(pool.clone()));
    let order_repo = Arc::new(PgOrderRepository::new(pool.clone()));
    let checkin_repo = Arc::new(PgCheckinRepository::new(pool.clone()));
    let blog_repo = Arc::new(PgBlogRepository::new(pool.clone()));

    // Initialize services
    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret));
    let user_service = Arc::new(UserService::new(
        user_repo,
        password_reset_repo,
        jwt_service.clone(),
    ));
    let program_service = Arc::new(ProgramService::new(program_repo.clone()));
    let order_service = Arc::new(OrderService::new(
        order_repo.clone(),
        program_repo,
        gateway,
        config.public_base_url.clone(),
    ));
    let checkin_service = Arc::new(CheckinService::new(checkin_repo, order_repo));
    let blog_service = Arc::new(BlogService::new(blog_repo));

    let public_router = Router::new()
        .route("/api/health", get(api::health::health_check))
        .route("/api/health/ready", get(api::health::readiness_check))
        .route("/api/health/live", get(api::health::liveness_check))
        .route("/api/register", post(api::auth::register_api))
        .route("/api/login", post(api::auth::login_api))
        .route("/api/refresh-token", post(api::auth::refresh_token_api))
        .route("/api/forgot-password", post(api::auth::forgot_password_api))
        .route("/api/reset-password", post(api::auth::reset_password_api))
        .route("/api/events/current", get(api::events::current_event_api))
        .route("/api/events/:slug", get(api::events::event_api))
        .route("/api/events/:slug/schedule", get(api::events::schedule_api))
        .route("/api/orders", post(api::orders::create_order_api))
        .route(
            "/api/payments/naboopay/webhook",
            post(api::orders::naboopay_webhook),
        )
        // Pages
        .route("/", get(views::site::home_page))
        .route("/schedule", get(views::site::schedule_page))
        .route("/speakers", get(views::site::speakers_page))
        .route("/exhibitors", get(views::site::exhibitors_page))
        .route("/tickets", get(views::site::tickets_page))
        .route("/blog", get(views::site::blog_list_page))
        .route("/blog/:slug", get(views::site::blog_post_page))
        .route(
            "/register-visit",
            get(views::site::register_visit_page).post(views::site::register_visit_post),
        )
        .route("/checkout", post(views::checkout::checkout_post))
        .route("/checkout/success", get(views::checkout::checkout_success_page))
        .route("/checkout/error", get(views::checkout::checkout_error_page))
        .route(
            "/login",
            get(views::auth::login_page).post(views::auth::login_post),
        )
        .route(
            "/register",
            get(views::auth::register_page).post(views::auth::register_post),
        )
        .route("/logout", get(views::auth::logout).post(views::auth::logout))
        .route(
            "/forgot-password",
            get(views::auth::forgot_password_page).post(views::auth::forgot_password_post),
        )
        .route(
            "/reset-password",
            get(views::auth::reset_password_page).post(views::auth::reset_password_post),
        );

    let user_api = Router::new()
        .route("/api/me", get(api::auth::me_api))
        .route("/api/me/orders", get(api::orders::my_orders_api))
        .route("/api/change-password", post(api::auth::change_password_api))
        .route("/api/orders/:external_id", get(api::orders::get_order_api))
        .route_layer(from_fn(require_auth));

    let staff_api = Router::new()
        .route("/api/checkin/search", get(api::checkin::search_api))
        .route(
            "/api/checkin",
            post(api::checkin::check_in_api).delete(api::checkin::undo_check_in_api),
        )
        .route("/api/checkin/stats/:event_id", get(api::checkin::stats_api))
        .route_layer(from_fn(require_staff))
        .route_layer(from_fn(require_auth));

    let admin_api = Router::new()
        .route("/api/admin/dashboard", get(api::admin::admin_dashboard))
        .route(
            "/api/admin/events",
            get(api::admin::list_events).post(api::admin::create_event),
        )
        .route(
            "/api/admin/events/:id",
            put(api::admin::update_event).delete(api::admin::delete_event),
        )
        .route("/api/admin/events/:id/passes", get(api::admin::list_passes))
        .route("/api/admin/events/:id/sessions", get(api::admin::list_sessions))
        .route("/api/admin/events/:id/speakers", get(api::admin::list_speakers))
        .route(
            "/api/admin/events/:id/exhibitors",
            get(api::admin::list_exhibitors),
        )
        .route("/api/admin/events/:id/visitors", get(api::admin::list_visitors))
        .route("/api/admin/passes", post(api::admin::create_pass))
        .route(
            "/api/admin/passes/:id",
            put(api::admin::update_pass).delete(api::admin::delete_pass),
        )
        .route("/api/admin/sessions", post(api::admin::create_session))
        .route(
            "/api/admin/sessions/:id",
            put(api::admin::update_session).delete(api::admin::delete_session),
        )
        .route("/api/admin/speakers", post(api::admin::create_speaker))
        .route(
            "/api/admin/speakers/:id",
            put(api::admin::update_speaker).delete(api::admin::delete_speaker),
        )
        .route("/api/admin/exhibitors", post(api::admin::create_exhibitor))
        .route(
            "/api/admin/exhibitors/:id",
            put(api::admin::update_exhibitor).delete(api::admin::delete_exhibitor),
        )
        .route("/api/admin/visitors", post(api::admin::create_visitor))
        .route(
            "/api/admin/visitors/:id",
            put(api::admin::update_visitor).delete(api::admin::delete_visitor),
        )
        .route(
            "/api/admin/posts",
            get(api::admin::list_posts).post(api::admin::create_post),
        )
        .route(
            "/api/admin/posts/:id",
            put(api::admin::update_post).delete(api::admin::delete_post),
        )
        .route("/api/admin/posts/:id/publish", post(api::admin::publish_post))
        .route(
            "/api/admin/posts/:id/unpublish",
            post(api::admin::unpublish_post),
        )
        .route(
            "/api/admin/users",
            get(api::admin::list_users).post(api::admin::create_user),
        )
        .route("/api/admin/users/:id/role", put(api::admin::set_user_role))
        .route("/api/admin/orders", get(api::admin::list_orders))
        .route("/api/admin/orders/:external_id", get(api::admin::get_order))
        .route(
            "/api/admin/orders/:external_id/cancel",
            post(api::admin::cancel_order),
        )
        .route(
            "/api/admin/orders/:external_id/reconcile",
            post(api::admin::reconcile_order),
        )
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn(require_auth));

    let user_pages = Router::new()
        .route("/account", get(views::account::account_page))
        .route(
            "/change-password",
            get(views::auth::change_password_page).post(views::auth::change_password_post),
        )
        .route_layer(from_fn(require_page_auth));

    let staff_pages = Router::new()
        .route(
            "/checkin",
            get(views::checkin::checkin_page).post(views::checkin::checkin_post),
        )
        .route_layer(from_fn(require_staff))
        .route_layer(from_fn(require_page_auth));

    let admin_pages = Router::new()
        .route("/admin", get(views::admin::dashboard_page))
        .route("/admin/orders", get(views::admin::orders_page))
        .route(
            "/admin/orders/:external_id/cancel",
            post(views::admin::cancel_order_post),
        )
        .route(
            "/admin/orders/:external_id/reconcile",
            post(views::admin::reconcile_order_post),
        )
        .route(
            "/admin/speakers",
            get(views::admin::speakers_page).post(views::admin::create_speaker_post),
        )
        .route(
            "/admin/speakers/:id/delete",
            post(views::admin::delete_speaker_post),
        )
        .route("/admin/posts", get(views::admin::posts_page))
        .route(
            "/admin/posts/new",
            get(views::admin::new_post_page).post(views::admin::create_post_post),
        )
        .route(
            "/admin/posts/:id/edit",
            get(views::admin::edit_post_page).post(views::admin::update_post_post),
        )
        .route(
            "/admin/posts/:id/publish",
            post(views::admin::publish_post_post),
        )
        .route(
            "/admin/posts/:id/unpublish",
            post(views::admin::unpublish_post_post),
        )
        .route(
            "/admin/posts/:id/delete",
            post(views::admin::delete_post_post),
        )
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn(require_page_auth));

    Router::new()
        .merge(public_router)
        .merge(user_api)
        .merge(staff_api)
        .merge(admin_api)
        .merge(user_pages)
        .merge(staff_pages)
        .merge(admin_pages)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .fallback(handler_404)
        // the middlewares above read these Extensions, so they wrap everything
        .layer(from_fn(optional_auth))
        .layer(Extension(user_service))
        .layer(Extension(program_service))
        .layer(Extension(order_service))
        .layer(Extension(checkin_service))
        .layer(Extension(blog_service))
        .layer(Extension(jwt_service))
        .layer(Extension(config))
        .layer(Extension(tera))
        .layer(Extension(pool))
        .layer(from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
}
