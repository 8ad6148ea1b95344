use axum::{extract::Extension, response::Response};
use std::sync::Arc;
use tera::Tera;

use crate::handler::errors::{ServiceError, page_error};
use crate::repository::OrderStatus;
use crate::repository::sqlx_impl::{
    PgOrderRepository, PgPasswordResetRepository, PgProgramRepository, PgUserRepository,
};
use crate::services::order_service::OrderService;
use crate::services::user_service::UserService;
use crate::views::{CurrentUser, page_context, render};

type UserServiceType = UserService<PgUserRepository, PgPasswordResetRepository>;
type OrderServiceType = OrderService<PgOrderRepository, PgProgramRepository>;

// GET /account
pub async fn account_page(
    Extension(users): Extension<Arc<UserServiceType>>,
    Extension(orders): Extension<Arc<OrderServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let Some(Extension(current)) = &user else {
        return page_error(
            &tmpl,
            &ServiceError::unauthorized("sign in to see your account"),
        );
    };

    let account = match users.get_user(current.user_id).await {
        Ok(account) => account,
        Err(e) => return page_error(&tmpl, &e),
    };

    let my_orders = match orders.list_orders_for_user(current.user_id).await {
        Ok(list) => list,
        Err(e) => return page_error(&tmpl, &e),
    };

    // tickets only exist on paid orders
    let mut paid = Vec::new();
    for order in my_orders.iter().filter(|o| o.status == OrderStatus::Paid) {
        match orders.get_order(order.external_id).await {
            Ok(details) => paid.push(details),
            Err(e) => return page_error(&tmpl, &e),
        }
    }

    let mut ctx = page_context("My account", &user);
    ctx.insert("account", &account);
    ctx.insert("orders", &my_orders);
    ctx.insert("paid_orders", &paid);
    render(&tmpl, "account.html", &ctx)
}
