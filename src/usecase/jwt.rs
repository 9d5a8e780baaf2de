use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum JwtError {
    #[error("Failed to validate token: {0}")]
    TokenValidationError(String),
    #[error("Token expired")]
    TokenExpired,
    #[error("Not an access token")]
    WrongTokenType,
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),
}

/// Claims as issued by the auth service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// The caller behind a verified access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: jsonwebtoken::DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, JwtError> {
        let mut validation = jsonwebtoken::Validation::default();
        validation.validate_exp = true;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::TokenValidationError(e.to_string()),
            })?
            .claims;

        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidSubject(claims.sub.clone()))?;

        Ok(Identity {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}
