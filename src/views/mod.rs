//! Server-rendered pages.
//!
//! Handlers build a [`tera::Context`] on top of [`page_context`], which carries
//! the page title and the signed-in user (if any) for the navigation bar.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::collections::HashMap;
use tera::{Context, Tera, Value};

use crate::domain::format_amount;
use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::render_error_page;

pub mod account;
pub mod admin;
pub mod auth;
pub mod checkin;
pub mod checkout;
pub mod site;

/// Set on every request by `optional_auth` when a session is present.
pub type CurrentUser = Option<Extension<AuthenticatedUser>>;

pub fn page_context(title: &str, user: &CurrentUser) -> Context {
    let mut ctx = Context::new();
    ctx.insert("title", title);
    if let Some(Extension(user)) = user {
        ctx.insert("current_user", user);
        ctx.insert("is_staff", &user.is_staff());
        ctx.insert("is_admin", &user.is_admin());
    }
    ctx
}

pub fn render(tmpl: &Tera, template: &str, ctx: &Context) -> Response {
    render_with_status(tmpl, StatusCode::OK, template, ctx)
}

pub fn render_with_status(tmpl: &Tera, status: StatusCode, template: &str, ctx: &Context) -> Response {
    match tmpl.render(template, ctx) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!(template, error = ?e, "Template rendering failed");
            render_error_page(tmpl, StatusCode::INTERNAL_SERVER_ERROR, "Template error")
        }
    }
}

/// Registers the filters the templates rely on.
pub fn register_filters(tera: &mut Tera) {
    tera.register_filter("money", money_filter);
}

/// `{{ pass.price | money(currency=pass.currency) }}`
fn money_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let amount = value
        .as_i64()
        .ok_or_else(|| tera::Error::msg("money filter expects an integer amount"))?;
    let currency = args
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("XOF");
    Ok(Value::String(format_amount(amount, currency)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_money_filter() {
        let mut args = HashMap::new();
        args.insert("currency".to_string(), json!("XOF"));
        assert_eq!(
            money_filter(&json!(15000), &args).unwrap(),
            json!("15 000 XOF")
        );
        assert!(money_filter(&json!("free"), &HashMap::new()).is_err());
    }

    #[test]
    fn test_page_context_exposes_roles() {
        let user = AuthenticatedUser {
            user_id: 7,
            email: "desk@example.sn".to_string(),
            username: "desk".to_string(),
            role: crate::domain::Role::Staff,
        };
        let ctx = page_context("Check-in", &Some(Extension(user)));
        let json = ctx.into_json();
        assert_eq!(json["title"], "Check-in");
        assert_eq!(json["is_staff"], true);
        assert_eq!(json["is_admin"], false);

        let anonymous = page_context("Home", &None).into_json();
        assert!(anonymous.get("current_user").is_none());
    }
}
