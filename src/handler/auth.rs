use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tera::Tera;

use crate::domain::Role;
use crate::handler::errors::{ErrorResponse, render_error_page};
use crate::services::jwt_service::{Claims, JwtService};

pub const SESSION_COOKIE: &str = "jwt_token";
const SESSION_MAX_AGE_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.role.includes(Role::Staff)
    }

    pub fn is_admin(&self) -> bool {
        self.role.includes(Role::Admin)
    }
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = anyhow::Error;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.sub.parse()?,
            email: claims.email,
            username: claims.username,
            role: claims.role,
        })
    }
}

fn authenticate(jwt_service: &JwtService, headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let token = extract_bearer_token(headers)?;
    let claims = jwt_service.verify_token(&token).ok()?;
    AuthenticatedUser::try_from(claims).ok()
}

/// Middleware that requires JWT authentication (JSON API).
pub async fn require_auth(
    Extension(jwt_service): Extension<Arc<JwtService>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if extract_bearer_token(&headers).is_none() {
        return ErrorResponse::unauthorized("Missing authorization header").into_response();
    }

    match authenticate(&jwt_service, &headers) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => ErrorResponse::unauthorized("Invalid or expired token").into_response(),
    }
}

/// Page variant of [`require_auth`]: anonymous visitors go to the login form.
pub async fn require_page_auth(
    Extension(jwt_service): Extension<Arc<JwtService>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&jwt_service, &headers) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => {
            let next_path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            Redirect::to(&format!("/login?next={}", urlencode(&next_path))).into_response()
        }
    }
}

/// Middleware that attaches the user when a valid token is present.
pub async fn optional_auth(
    Extension(jwt_service): Extension<Arc<JwtService>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(user) = authenticate(&jwt_service, &headers) {
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

/// Check-in desk and above.
pub async fn require_staff(
    Extension(tmpl): Extension<Tera>,
    request: Request,
    next: Next,
) -> Response {
    require_role(Role::Staff, &tmpl, request, next).await
}

/// Back-office.
pub async fn require_admin(
    Extension(tmpl): Extension<Tera>,
    request: Request,
    next: Next,
) -> Response {
    require_role(Role::Admin, &tmpl, request, next).await
}

async fn require_role(required: Role, tmpl: &Tera, request: Request, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<AuthenticatedUser>()
        .is_some_and(|user| user.role.includes(required));

    if allowed {
        return next.run(request).await;
    }

    let message = format!("{} access required", required);
    if request.uri().path().starts_with("/api/") {
        ErrorResponse::forbidden(message).into_response()
    } else {
        render_error_page(tmpl, StatusCode::FORBIDDEN, &message)
    }
}

/// `Set-Cookie` value holding the session token.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_MAX_AGE_SECS}{secure}"
    )
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extract Bearer token from Authorization header or the session cookie.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    if let Some(cookie_header) = headers.get("cookie") {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();

                if let Some(token_value) = cookie
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    if !token_value.is_empty() {
                        return Some(token_value.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Only same-site relative paths are accepted as post-login targets.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if is_local_path(path) => path,
        _ => "/account",
    }
}

/// Browsers read `\` as `/` and drop tabs and newlines, so `/\host` and
/// `/\t/host` both leave the site.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_extract_bearer_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer test123"));

        let token = extract_bearer_token(&headers);
        assert_eq!(token, Some("test123".to_string()));
    }

    #[test]
    fn test_extract_bearer_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("other=value; jwt_token=test123"),
        );

        let token = extract_bearer_token(&headers);
        assert_eq!(token, Some("test123".to_string()));
    }

    #[test]
    fn test_extract_bearer_token_ignores_similar_cookie_names() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt_token_old=abc"));

        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_bearer_token_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt_token="));
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let claims = Claims {
            sub: "123".to_string(),
            email: "awa@example.sn".to_string(),
            username: "awa".to_string(),
            role: Role::Staff,
            exp: 1234567890,
            iat: 1234567890,
            iss: "confhub".to_string(),
        };

        let user = AuthenticatedUser::try_from(claims).unwrap();
        assert_eq!(user.user_id, 123);
        assert!(user.is_staff());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_claims_with_bad_subject_are_rejected() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            email: "awa@example.sn".to_string(),
            username: "awa".to_string(),
            role: Role::Admin,
            exp: 0,
            iat: 0,
            iss: "confhub".to_string(),
        };
        assert!(AuthenticatedUser::try_from(claims).is_err());
    }

    #[test]
    fn test_session_cookie() {
        let cookie = session_cookie("abc", true);
        assert!(cookie.starts_with("jwt_token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/checkin")), "/checkin");
        assert_eq!(safe_next(Some("//evil.example")), "/account");
        assert_eq!(safe_next(Some("/\\evil.example")), "/account");
        assert_eq!(safe_next(Some("/\t/evil.example")), "/account");
        assert_eq!(safe_next(Some("/blog?tag=a\\b")), "/account");
        assert_eq!(safe_next(Some("/account/orders?page=2")), "/account/orders?page=2");
        assert_eq!(safe_next(Some("https://evil.example")), "/account");
        assert_eq!(safe_next(None), "/account");
    }
}
