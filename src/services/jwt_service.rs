use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::Role;

const ISSUER: &str = "confhub";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // Subject (user_id)
    pub email: String,    // User email
    pub username: String, // Username
    pub role: Role,       // Access level
    pub exp: i64,         // Expiration time
    pub iat: i64,         // Issued at
    pub iss: String,      // Issuer
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            issuer: ISSUER.to_string(),
            ttl: Duration::hours(12),
        }
    }

    pub fn generate_token(
        &self,
        user_id: i64,
        email: &str,
        username: &str,
        role: Role,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            username: username.to_string(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode JWT: {}", e))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Failed to decode JWT: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn refresh_token(&self, token: &str) -> Result<String> {
        let claims = self.verify_token(token)?;

        self.generate_token(
            claims.sub.parse()?,
            &claims.email,
            &claims.username,
            claims.role,
        )
    }

    pub fn extract_user_id(&self, token: &str) -> Result<i64> {
        let claims = self.verify_token(token)?;
        claims
            .sub
            .parse()
            .map_err(|e| anyhow!("Invalid user ID in token: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_token_generation_and_verification() {
        let service = JwtService::new("test_secret");

        let token = service
            .generate_token(1, "awa@example.sn", "awa", Role::Staff)
            .unwrap();
        let claims = service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "1");
        assert_eq!(claims.email, "awa@example.sn");
        assert_eq!(claims.username, "awa");
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(claims.iss, "confhub");
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let issuer = JwtService::new("secret_a");
        let verifier = JwtService::new("secret_b");

        let token = issuer
            .generate_token(1, "awa@example.sn", "awa", Role::Admin)
            .unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_refresh_token_keeps_role() {
        let service = JwtService::new("test_secret");

        let original_token = service
            .generate_token(7, "moussa@example.sn", "moussa", Role::Admin)
            .unwrap();
        let refreshed_token = service.refresh_token(&original_token).unwrap();

        let original_claims = service.verify_token(&original_token).unwrap();
        let refreshed_claims = service.verify_token(&refreshed_token).unwrap();

        assert_eq!(original_claims.sub, refreshed_claims.sub);
        assert_eq!(refreshed_claims.role, Role::Admin);
        assert!(refreshed_claims.exp >= original_claims.exp);
    }

    #[test]
    fn test_extract_user_id() {
        let service = JwtService::new("test_secret");

        let token = service
            .generate_token(42, "awa@example.sn", "awa", Role::Attendee)
            .unwrap();

        assert_eq!(service.extract_user_id(&token).unwrap(), 42);
        assert!(service.extract_user_id("not-a-token").is_err());
    }
}
