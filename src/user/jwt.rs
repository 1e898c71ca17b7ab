//! HS256 access/refresh tokens.

use super::UserAccount;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub token_type: TokenType,
    /// Token version of the account at issue time.
    pub ver: u32,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<usize> {
        self.sub.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum JwtError {
    #[error("Token expired")]
    Expired,

    #[error("Expected a {0:?} token")]
    WrongType(TokenType),

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Could not sign token: {0}")]
    Encode(String),
}

pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl JwtIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_pair(&self, user: &UserAccount) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            refresh: self.issue(user, TokenType::Refresh)?,
            access: self.issue(user, TokenType::Access)?,
        })
    }

    pub fn issue_access(&self, user: &UserAccount) -> Result<String, JwtError> {
        self.issue(user, TokenType::Access)
    }

    fn issue(&self, user: &UserAccount, token_type: TokenType) -> Result<String, JwtError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let iat = now_secs();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            token_type,
            ver: user.token_version,
            iat,
            exp: iat + ttl.as_secs(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::Encode(e.to_string()))
    }

    /// Checks signature, expiry and token type. Whether the account still
    /// accepts the token version is up to the caller.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            }
        })?;
        if data.claims.token_type != expected {
            return Err(JwtError::WrongType(expected));
        }
        Ok(data.claims)
    }
}
