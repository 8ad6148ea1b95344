use crate::domain::user::looks_like_email;
use crate::domain::{Email, Password, Phone, Role};
use crate::handler::errors::ServiceError;
use crate::repository::{
    NewPasswordResetToken, NewUser, PasswordResetRepository, User, UserRepository,
};
use crate::services::jwt_service::JwtService;
use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use password_hash::{PasswordHash, PasswordVerifier};
use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const RESET_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub external_id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub first_login: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            external_id: user.external_id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            phone: user.phone,
            role: user.role,
            first_login: user.first_login,
            created_at: user.created_at,
        }
    }
}

/// Account created by an administrator. The user must pick a new password
/// on first login.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: Email,
    pub username: String,
    pub full_name: String,
    pub password: Password,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub requires_password_change: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Clone)]
pub struct UserService<U: UserRepository, P: PasswordResetRepository> {
    pub user_repo: Arc<U>,
    pub password_reset_repo: Arc<P>,
    pub jwt_service: Arc<JwtService>,
}

impl<U: UserRepository, P: PasswordResetRepository> UserService<U, P> {
    pub fn new(user_repo: Arc<U>, password_reset_repo: Arc<P>, jwt_service: Arc<JwtService>) -> Self {
        Self {
            user_repo,
            password_reset_repo,
            jwt_service,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let email = Email::try_from(req.email.as_str())
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        let password = Password::try_from(req.password.as_str())
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        let phone = match req.phone.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Some(
                Phone::try_from(p).map_err(|e| ServiceError::validation(e.to_string()))?,
            ),
            _ => None,
        };

        let user = self
            .insert_checked(
                email,
                req.username,
                req.full_name,
                phone.map(|p| p.to_string()),
                &password,
                Role::Attendee,
                false,
            )
            .await?;

        tracing::info!(user_id = user.user_id, "user registered");
        self.issue(user)
    }

    /// Admin-side account creation with an explicit role.
    pub async fn create_user(&self, req: CreateUserRequest) -> Result<UserResponse> {
        let user = self
            .insert_checked(
                req.email,
                req.username,
                req.full_name,
                None,
                &req.password,
                req.role,
                true,
            )
            .await?;

        tracing::info!(user_id = user.user_id, role = %user.role, "user created by admin");
        Ok(user.into())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_checked(
        &self,
        email: Email,
        username: String,
        full_name: String,
        phone: Option<String>,
        password: &Password,
        role: Role,
        first_login: bool,
    ) -> Result<User> {
        let username = username.trim().to_string();
        let full_name = full_name.trim().to_string();

        if username.len() < 3 || looks_like_email(&username) {
            return Err(ServiceError::validation(
                "username must be at least 3 characters and not an email",
            ));
        }
        if full_name.is_empty() {
            return Err(ServiceError::validation("full name is required"));
        }

        if self
            .user_repo
            .find_by_email(email.as_ref())
            .await?
            .is_some()
        {
            return Err(ServiceError::conflict("email already registered"));
        }

        if self.user_repo.find_by_username(&username).await?.is_some() {
            return Err(ServiceError::conflict("username taken"));
        }

        let password_hash = self.hash_password(password.expose())?;

        let new_user = NewUser {
            external_id: Uuid::new_v4(),
            email: email.to_string(),
            username,
            full_name,
            phone,
            password_hash,
            role,
            first_login,
        };

        self.user_repo.insert_user(new_user).await
    }

    pub async fn login(&self, identity: String, password: String) -> Result<AuthResponse> {
        let identity = identity.trim();
        let user_opt = if looks_like_email(identity) {
            self.user_repo
                .find_by_email(&identity.to_lowercase())
                .await?
        } else {
            self.user_repo.find_by_username(identity).await?
        };

        let user = user_opt.ok_or_else(|| ServiceError::unauthorized("invalid credentials"))?;

        if !self.verify_password(&password, &user.password_hash)? {
            tracing::warn!(user_id = user.user_id, "failed login attempt");
            return Err(ServiceError::unauthorized("invalid credentials"));
        }

        self.issue(user)
    }

    fn issue(&self, user: User) -> Result<AuthResponse> {
        let token =
            self.jwt_service
                .generate_token(user.user_id, &user.email, &user.username, user.role)?;
        let requires_password_change = user.first_login;

        Ok(AuthResponse {
            user: user.into(),
            token,
            requires_password_change,
        })
    }

    pub async fn change_password(&self, user_id: i64, req: ChangePasswordRequest) -> Result<()> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;

        if !self.verify_password(&req.current_password, &user.password_hash)? {
            return Err(ServiceError::validation("current password is incorrect"));
        }

        let new_password = Password::try_from(req.new_password.as_str())
            .map_err(|_| ServiceError::validation("new password too short"))?;
        let new_password_hash = self.hash_password(new_password.expose())?;

        self.user_repo
            .update_user_password(user_id, &new_password_hash)
            .await?;
        self.user_repo.set_first_login(user_id, false).await?;

        Ok(())
    }

    /// Creates a reset token for the account, if there is one. Unknown
    /// addresses yield `None` so callers can answer identically either way.
    pub async fn forgot_password(&self, req: ForgotPasswordRequest) -> Result<Option<String>> {
        let email = req.email.trim().to_lowercase();
        let Some(user) = self.user_repo.find_by_email(&email).await? else {
            return Ok(None);
        };

        let token = self.generate_reset_token();
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

        self.password_reset_repo
            .create_reset_token(NewPasswordResetToken {
                user_id: user.user_id,
                token: token.clone(),
                expires_at,
            })
            .await?;

        Ok(Some(token))
    }

    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<()> {
        let reset_token = self
            .password_reset_repo
            .find_valid_token(&req.token)
            .await?
            .ok_or_else(|| ServiceError::validation("invalid or expired token"))?;

        let new_password = Password::try_from(req.new_password.as_str())
            .map_err(|_| ServiceError::validation("new password too short"))?;
        let new_password_hash = self.hash_password(new_password.expose())?;

        self.user_repo
            .update_user_password(reset_token.user_id, &new_password_hash)
            .await?;
        self.user_repo
            .set_first_login(reset_token.user_id, false)
            .await?;

        self.password_reset_repo
            .mark_token_used(reset_token.token_id)
            .await?;

        Ok(())
    }

    pub async fn refresh_token(&self, token: &str) -> Result<String> {
        self.jwt_service
            .refresh_token(token)
            .map_err(|_| ServiceError::unauthorized("invalid token"))
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<UserResponse> {
        let user_id = self
            .jwt_service
            .extract_user_id(token)
            .map_err(|_| ServiceError::unauthorized("invalid token"))?;
        self.get_user(user_id).await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<UserResponse> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;
        Ok(user.into())
    }

    pub async fn list_users(&self, page: i64, per_page: i64) -> Result<(Vec<UserResponse>, i64)> {
        let per_page = per_page.clamp(1, 200);
        let offset = (page.max(1) - 1).saturating_mul(per_page);
        let users = self.user_repo.list_users(per_page, offset).await?;
        let total = self.user_repo.count_users().await?;
        Ok((users.into_iter().map(UserResponse::from).collect(), total))
    }

    pub async fn set_role(&self, actor_id: i64, user_id: i64, role: Role) -> Result<()> {
        if actor_id == user_id && role != Role::Admin {
            return Err(ServiceError::validation("admins cannot demote themselves"));
        }
        if !self.user_repo.set_role(user_id, role).await? {
            return Err(ServiceError::not_found("user not found"));
        }
        tracing::info!(actor_id, user_id, role = %role, "role changed");
        Ok(())
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64> {
        self.password_reset_repo.cleanup_expired_tokens().await
    }

    fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid stored password hash"))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(thread_rng());
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!(e))?
            .to_string();
        Ok(password_hash)
    }

    fn generate_reset_token(&self) -> String {
        let token_bytes: [u8; 32] = thread_rng().r#gen();
        hex::encode(token_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::errors::status_for;
    use crate::repository::PasswordResetToken;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockUserRepository {
        users: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl UserRepository for MockUserRepository {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.username == username).cloned())
        }

        async fn find_by_id(&self, user_id: i64) -> Result<Option<User>> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.user_id == user_id).cloned())
        }

        async fn insert_user(&self, new_user: NewUser) -> Result<User> {
            let mut users = self.users.lock().unwrap();
            let user = User {
                user_id: (users.len() + 1) as i64,
                external_id: new_user.external_id,
                email: new_user.email,
                username: new_user.username,
                full_name: new_user.full_name,
                phone: new_user.phone,
                password_hash: new_user.password_hash,
                role: new_user.role,
                first_login: new_user.first_login,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            users.push(user.clone());
            Ok(user)
        }

        async fn update_user_password(&self, user_id: i64, new_password_hash: &str) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
                user.password_hash = new_password_hash.to_string();
            }
            Ok(())
        }

        async fn set_first_login(&self, user_id: i64, first_login: bool) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
                user.first_login = first_login;
            }
            Ok(())
        }

        async fn set_role(&self, user_id: i64, role: Role) -> Result<bool> {
            let mut users = self.users.lock().unwrap();
            Ok(match users.iter_mut().find(|u| u.user_id == user_id) {
                Some(user) => {
                    user.role = role;
                    true
                }
                None => false,
            })
        }

        async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn count_users(&self) -> Result<i64> {
            Ok(self.users.lock().unwrap().len() as i64)
        }
    }

    #[derive(Default)]
    struct MockPasswordResetRepository {
        tokens: Mutex<Vec<PasswordResetToken>>,
    }

    #[async_trait]
    impl PasswordResetRepository for MockPasswordResetRepository {
        async fn create_reset_token(&self, token: NewPasswordResetToken) -> Result<PasswordResetToken> {
            let mut tokens = self.tokens.lock().unwrap();
            let rec = PasswordResetToken {
                token_id: (tokens.len() + 1) as i64,
                user_id: token.user_id,
                token: token.token,
                expires_at: token.expires_at,
                used_at: None,
                created_at: Utc::now(),
            };
            tokens.push(rec.clone());
            Ok(rec)
        }

        async fn find_valid_token(&self, token: &str) -> Result<Option<PasswordResetToken>> {
            let tokens = self.tokens.lock().unwrap();
            Ok(tokens
                .iter()
                .find(|t| t.token == token && t.used_at.is_none() && t.expires_at > Utc::now())
                .cloned())
        }

        async fn mark_token_used(&self, token_id: i64) -> Result<()> {
            let mut tokens = self.tokens.lock().unwrap();
            if let Some(t) = tokens.iter_mut().find(|t| t.token_id == token_id) {
                t.used_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn cleanup_expired_tokens(&self) -> Result<u64> {
            let mut tokens = self.tokens.lock().unwrap();
            let before = tokens.len();
            tokens.retain(|t| t.used_at.is_none() && t.expires_at > Utc::now());
            Ok((before - tokens.len()) as u64)
        }
    }

    fn service() -> UserService<MockUserRepository, MockPasswordResetRepository> {
        UserService::new(
            Arc::new(MockUserRepository::default()),
            Arc::new(MockPasswordResetRepository::default()),
            Arc::new(JwtService::new("test_secret")),
        )
    }

    fn register_req(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            full_name: "Awa Ndiaye".to_string(),
            phone: Some("+221 77 123 45 67".to_string()),
            password: "password123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_attendee() {
        let service = service();
        let auth = service
            .register(register_req("Awa@Example.sn", "awa"))
            .await
            .unwrap();

        assert_eq!(auth.user.email, "awa@example.sn");
        assert_eq!(auth.user.role, Role::Attendee);
        assert_eq!(auth.user.phone.as_deref(), Some("+221771234567"));
        assert!(!auth.requires_password_change);

        let claims = service.jwt_service.verify_token(&auth.token).unwrap();
        assert_eq!(claims.role, Role::Attendee);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let service = service();
        service.register(register_req("awa@example.sn", "awa")).await.unwrap();

        let err = service
            .register(register_req("awa@example.sn", "awa2"))
            .await
            .unwrap_err();
        assert_eq!(status_for(&err), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let service = service();

        let err = service.register(register_req("nope", "awa")).await.unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);

        let err = service
            .register(register_req("awa@example.sn", "a@b.cd"))
            .await
            .unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_by_email_and_username() {
        let service = service();
        service.register(register_req("awa@example.sn", "awa")).await.unwrap();

        assert!(service
            .login("AWA@example.sn".into(), "password123".into())
            .await
            .is_ok());
        assert!(service.login("awa".into(), "password123".into()).await.is_ok());

        let err = service
            .login("awa".into(), "wrong-password".into())
            .await
            .unwrap_err();
        assert_eq!(status_for(&err), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_created_user_must_change_password() {
        let service = service();
        let created = service
            .create_user(CreateUserRequest {
                email: Email::try_from("staff@example.sn").unwrap(),
                username: "desk1".to_string(),
                full_name: "Desk One".to_string(),
                password: Password::try_from("temporary1").unwrap(),
                role: Role::Staff,
            })
            .await
            .unwrap();
        assert!(created.first_login);

        let auth = service.login("desk1".into(), "temporary1".into()).await.unwrap();
        assert!(auth.requires_password_change);

        service
            .change_password(
                created.user_id,
                ChangePasswordRequest {
                    current_password: "temporary1".into(),
                    new_password: "permanent1".into(),
                },
            )
            .await
            .unwrap();

        let auth = service.login("desk1".into(), "permanent1".into()).await.unwrap();
        assert!(!auth.requires_password_change);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let service = service();
        service.register(register_req("awa@example.sn", "awa")).await.unwrap();

        let unknown = service
            .forgot_password(ForgotPasswordRequest {
                email: "ghost@example.sn".into(),
            })
            .await
            .unwrap();
        assert!(unknown.is_none());

        let token = service
            .forgot_password(ForgotPasswordRequest {
                email: "awa@example.sn".into(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.len(), 64);

        service
            .reset_password(ResetPasswordRequest {
                token: token.clone(),
                new_password: "brandnew123".into(),
            })
            .await
            .unwrap();
        assert!(service.login("awa".into(), "brandnew123".into()).await.is_ok());

        // tokens are single use
        assert!(service
            .reset_password(ResetPasswordRequest {
                token,
                new_password: "another123".into(),
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_role() {
        let service = service();
        let auth = service.register(register_req("awa@example.sn", "awa")).await.unwrap();

        service.set_role(99, auth.user.user_id, Role::Staff).await.unwrap();
        assert_eq!(service.get_user(auth.user.user_id).await.unwrap().role, Role::Staff);

        let err = service.set_role(99, 1234, Role::Staff).await.unwrap_err();
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);

        let err = service
            .set_role(auth.user.user_id, auth.user.user_id, Role::Attendee)
            .await
            .unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_users_pages() {
        let service = service();
        service.register(register_req("awa@example.sn", "awa")).await.unwrap();
        service.register(register_req("moussa@example.sn", "moussa")).await.unwrap();

        let (users, total) = service.list_users(1, 1).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(total, 2);

        let (users, total) = service.list_users(i64::MAX, 200).await.unwrap();
        assert!(users.is_empty());
        assert_eq!(total, 2);
    }
}
