//! Authentication and authorization utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - Bearer header verification with scope checks
//! - The environment-gated bootstrap credential provider

use crate::config::{AuthConfig, BootstrapConfig};
use crate::errors::{AppError, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Scope granted to portal administrators
pub const SCOPE_ADMIN: &str = "admin";

/// Scope granted to employees authenticated via PIN
pub const SCOPE_EMPLOYEE: &str = "employee";

/// Identity attached to bootstrap-token requests
pub const BOOTSTRAP_IDENTITY: &str = "bootstrap@localhost";

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated email identity
    pub email: String,

    /// Scopes/permissions
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Check if the context has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope) || self.scopes.iter().any(|s| s == SCOPE_ADMIN)
    }

    /// Require a specific scope, returning error if not present
    pub fn require_scope(&self, scope: &str) -> Result<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: format!("Missing required scope: {}", scope),
            })
        }
    }

    pub fn is_admin(&self) -> bool {
        self.has_scope(SCOPE_ADMIN)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (email identity)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, email: &str, scopes: Vec<String>) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            scopes,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidCredentials,
            })
    }
}

/// Hash a password for storage/comparison
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate a password against a stored hash
pub fn validate_password(password: &str, stored_hash: &str) -> bool {
    hash_password(password) == stored_hash
}

/// Extract the token from an Authorization header
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Bootstrap credentials for test and first-run setups.
///
/// All checks are short-circuited to false unless the config explicitly
/// enables bootstrap mode, so production deployments can turn the whole
/// path off. Every accepted bootstrap credential is logged loudly.
#[derive(Debug, Clone, Default)]
pub struct BootstrapCredentials {
    config: BootstrapConfig,
}

impl BootstrapCredentials {
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check the static bearer token
    pub fn token_matches(&self, token: &str) -> bool {
        self.config.enabled
            && self
                .config
                .bearer_token
                .as_deref()
                .is_some_and(|t| !t.is_empty() && t == token)
    }

    /// Check the master PIN that bypasses the access-request scan
    pub fn master_pin_matches(&self, pin: &str) -> bool {
        self.config.enabled
            && self
                .config
                .master_pin
                .as_deref()
                .is_some_and(|p| !p.is_empty() && p == pin)
    }

    /// Check the fixed admin login password
    pub fn admin_password_matches(&self, password: &str) -> bool {
        self.config.enabled
            && self
                .config
                .admin_password
                .as_deref()
                .is_some_and(|p| !p.is_empty() && p == password)
    }
}

/// Verifies bearer credentials for the gateway. Cheap to clone.
#[derive(Clone)]
pub struct AuthVerifier {
    inner: Arc<VerifierInner>,
}

struct VerifierInner {
    jwt: JwtManager,
    bootstrap: BootstrapCredentials,
}

impl AuthVerifier {
    pub fn new(jwt: JwtManager, bootstrap: BootstrapCredentials) -> Self {
        Self {
            inner: Arc::new(VerifierInner { jwt, bootstrap }),
        }
    }

    /// Build from configuration. Fails when no JWT secret is configured
    /// and bootstrap mode is off, because no credential could ever be
    /// issued or verified.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ if config.bootstrap.enabled => "civica-bootstrap-secret".to_string(),
            _ => {
                return Err(AppError::Configuration {
                    message: "auth.jwt_secret is required unless bootstrap mode is enabled".into(),
                })
            }
        };

        Ok(Self::new(
            JwtManager::new(&secret, config.jwt_expiration_secs),
            BootstrapCredentials::new(config.bootstrap.clone()),
        ))
    }

    pub fn bootstrap(&self) -> &BootstrapCredentials {
        &self.inner.bootstrap
    }

    /// Issue a token for an authenticated identity
    pub fn issue_token(&self, email: &str, scopes: Vec<String>) -> Result<String> {
        self.inner.jwt.generate_token(email, scopes)
    }

    /// Verify an Authorization header value and produce the auth context
    pub fn verify_bearer(&self, auth_header: &str) -> Result<AuthContext> {
        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Malformed Authorization header".to_string(),
        })?;

        if self.inner.bootstrap.token_matches(token) {
            tracing::warn!("Request authenticated via bootstrap bearer token");
            return Ok(AuthContext {
                email: BOOTSTRAP_IDENTITY.to_string(),
                scopes: vec![SCOPE_ADMIN.to_string()],
            });
        }

        let claims = self.inner.jwt.validate_token(token)?;
        Ok(AuthContext {
            email: claims.sub,
            scopes: claims.scopes,
        })
    }
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    AuthVerifier: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let verifier = AuthVerifier::from_ref(state);

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        verifier.verify_bearer(auth_header)
    }
}

/// Extractor variant that never rejects, for routes where authentication
/// only widens visibility (e.g. admins seeing unapproved papers).
pub struct MaybeAuth(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
    AuthVerifier: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(MaybeAuth(
            AuthContext::from_request_parts(parts, state).await.ok(),
        ))
    }
}
