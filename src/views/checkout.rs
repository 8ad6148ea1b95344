use axum::{
    extract::{Extension, Form, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tera::Tera;
use uuid::Uuid;

use crate::handler::errors::{page_error, public_message, status_for};
use crate::repository::sqlx_impl::{PgOrderRepository, PgProgramRepository};
use crate::services::order_service::{CheckoutOutcome, CreateOrderRequest, OrderLine, OrderService};
use crate::services::program_service::ProgramService;
use crate::views::site::render_tickets;
use crate::views::{CurrentUser, page_context, render};

type OrderServiceType = OrderService<PgOrderRepository, PgProgramRepository>;
type ProgramServiceType = ProgramService<PgProgramRepository>;

const QUANTITY_FIELD_PREFIX: &str = "qty_";

#[derive(Deserialize)]
pub struct ReturnQuery {
    pub order: Option<Uuid>,
}

/// Reads `qty_<pass_id>` fields; blank and zero quantities are skipped, the
/// rest is left to order validation.
pub fn order_lines(form: &HashMap<String, String>) -> Result<Vec<OrderLine>, String> {
    let mut lines = Vec::new();
    for (key, value) in form {
        let Some(pass_id) = key.strip_prefix(QUANTITY_FIELD_PREFIX) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let pass_id: i64 = pass_id
            .parse()
            .map_err(|_| format!("unknown pass `{}`", pass_id))?;
        let quantity: i32 = value
            .parse()
            .map_err(|_| format!("invalid quantity `{}`", value))?;
        if quantity != 0 {
            lines.push(OrderLine { pass_id, quantity });
        }
    }
    lines.sort_by_key(|l| l.pass_id);
    Ok(lines)
}

// POST /checkout
pub async fn checkout_post(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(program): Extension<Arc<ProgramServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let items = match order_lines(&form) {
        Ok(items) => items,
        Err(message) => {
            return render_tickets(
                &program,
                &tmpl,
                &user,
                StatusCode::BAD_REQUEST,
                Some(&message),
                Some(&form),
            )
            .await;
        }
    };

    let field = |name: &str| form.get(name).cloned().unwrap_or_default();
    let req = CreateOrderRequest {
        items,
        buyer_name: field("buyer_name"),
        buyer_email: field("buyer_email"),
        buyer_phone: form.get("buyer_phone").cloned(),
    };
    let user_id = user.as_ref().map(|Extension(u)| u.user_id);

    match orders.create_order(req, user_id).await {
        Ok(CheckoutOutcome::Redirect { checkout_url, .. }) => {
            Redirect::to(&checkout_url).into_response()
        }
        Ok(CheckoutOutcome::Completed { order }) => Redirect::to(&format!(
            "/checkout/success?order={}",
            order.order.external_id
        ))
        .into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                return page_error(&tmpl, &e);
            }
            render_tickets(
                &program,
                &tmpl,
                &user,
                status,
                Some(&public_message(&e)),
                Some(&form),
            )
            .await
        }
    }
}

// GET /checkout/success?order=<external_id>
//
// The buyer usually lands here before the webhook does, so the remote
// transaction is read once before showing the order.
pub async fn checkout_success_page(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<ReturnQuery>,
) -> Response {
    let Some(external_id) = params.order else {
        return Redirect::to("/tickets").into_response();
    };

    if let Err(e) = orders.reconcile(external_id).await {
        tracing::warn!(external_id = %external_id, error = %e, "reconcile on return failed");
    }

    match orders.get_order(external_id).await {
        Ok(details) => {
            let mut ctx = page_context("Your order", &user);
            ctx.insert("details", &details);
            ctx.insert("status", &details.order.status.to_string());
            render(&tmpl, "checkout_success.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /checkout/error?order=<external_id>
pub async fn checkout_error_page(
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<ReturnQuery>,
) -> Response {
    let mut ctx = page_context("Payment not completed", &user);

    if let Some(external_id) = params.order {
        if let Err(e) = orders.reconcile(external_id).await {
            tracing::warn!(external_id = %external_id, error = %e, "reconcile on return failed");
        }
        if let Ok(details) = orders.get_order(external_id).await {
            ctx.insert("details", &details);
            ctx.insert("status", &details.order.status.to_string());
        }
    }

    render(&tmpl, "checkout_error.html", &ctx)
}
