use axum::{
    body::Bytes,
    extract::{Extension, Json, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::{ErrorResponse, ServiceError};
use crate::repository::sqlx_impl::{PgOrderRepository, PgProgramRepository};
use crate::services::naboopay::{PaymentNotification, SIGNATURE_HEADER, verify_signature};
use crate::services::order_service::{CreateOrderRequest, OrderService};

type OrderServiceType = OrderService<PgOrderRepository, PgProgramRepository>;

/// POST /api/orders
pub async fn create_order_api(
    Extension(service): Extension<Arc<OrderServiceType>>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let user_id = user.map(|Extension(u)| u.user_id);
    let outcome = service.create_order(payload, user_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/orders/:external_id
pub async fn get_order_api(
    Extension(service): Extension<Arc<OrderServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(external_id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let details = service.get_order(external_id).await?;
    if details.order.user_id != Some(user.user_id) && !user.is_admin() {
        // same answer as a missing order
        return Err(ServiceError::not_found("order not found").into());
    }
    Ok(Json(details))
}

/// GET /api/me/orders
pub async fn my_orders_api(
    Extension(service): Extension<Arc<OrderServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(service.list_orders_for_user(user.user_id).await?))
}

/// POST /api/payments/naboopay/webhook
///
/// The signature covers the raw body, so it is checked before parsing.
pub async fn naboopay_webhook(
    Extension(service): Extension<Arc<OrderServiceType>>,
    Extension(config): Extension<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ErrorResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ErrorResponse::unauthorized("Missing signature"))?;

    if !verify_signature(&config.naboopay.webhook_secret, &body, signature) {
        tracing::warn!("webhook rejected: bad signature");
        return Err(ErrorResponse::unauthorized("Invalid signature"));
    }

    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| ErrorResponse::bad_request(format!("Invalid payload: {}", e)))?;

    tracing::info!(
        reference = %notification.reference,
        status = ?notification.status,
        "naboopay notification received"
    );

    let outcome = service.handle_payment_notification(notification).await?;
    Ok(Json(outcome))
}
