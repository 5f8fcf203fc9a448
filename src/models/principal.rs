//! Authenticated principal supplied by the identity provider

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Principal role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Librarian,
    Member,
}

/// Bearer token claims issued by the identity provider (HS256)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable principal identifier
    pub sub: String,
    pub role: Role,
    /// Member external identifier, present for member principals
    #[serde(default)]
    pub member_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Encode claims as a signed token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// The actor behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub member_id: Option<String>,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            id: claims.sub,
            role: claims.role,
            member_id: claims.member_id,
        }
    }
}

impl Principal {
    pub fn is_librarian(&self) -> bool {
        self.role == Role::Librarian
    }

    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.is_librarian() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian role required".to_string()))
        }
    }

    /// Member external id a member principal is restricted to
    pub fn own_member_id(&self) -> Result<&str, AppError> {
        self.member_id
            .as_deref()
            .ok_or_else(|| AppError::Authorization("Token carries no member identity".to_string()))
    }
}
