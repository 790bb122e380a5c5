use crate::errors::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Interface to the account subsystem's tokens: this backend only needs to
/// recognize an authenticated user from a signed bearer token. Session
/// storage, refresh and revocation live with the account service.
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn generate_token(&self, user_id: &Uuid, username: &str, email: &str) -> Result<String> {
        let now = Utc::now();
        let expiration = now + Duration::hours(24);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            jti,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| AppError::Authentication(format!("Failed to generate token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }
}

#[derive(Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| AppError::Authentication(format!("Invalid user ID in token: {}", e)))?;

        Ok(Self {
            user_id,
            username: claims.username,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_round_trips() {
        let manager = JwtManager::new("test-secret".to_string());
        let user_id = Uuid::new_v4();

        let token = manager
            .generate_token(&user_id, "ada", "ada@example.com")
            .unwrap();
        let data = manager.validate_token(&token).unwrap();
        let user = AuthenticatedUser::try_from(data.claims).unwrap();

        assert_eq!(user.user_id, user_id);
        assert_eq!(user.username, "ada");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let manager = JwtManager::new("test-secret".to_string());
        let other = JwtManager::new("other-secret".to_string());
        let token = manager
            .generate_token(&Uuid::new_v4(), "ada", "ada@example.com")
            .unwrap();

        let err = other.validate_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
