//! JWT validation
//!
//! FerroPDV never issues tokens: sessions live in Supabase Auth and the API
//! only validates the HS256 tokens Supabase signs. The platform role rides in
//! `app_metadata.pdv_role`, set by the admin panel.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims structure for Supabase-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    /// Subject (user ID as string, will be parsed to UUID)
    pub sub: String,
    /// Email (may be absent for phone signups)
    pub email: Option<String>,
    /// Role (authenticated, anon, etc.)
    pub role: Option<String>,
    /// Audience
    pub aud: Option<String>,
    /// Expiration
    pub exp: i64,
    /// Custom application metadata
    #[serde(default)]
    pub app_metadata: Option<AppMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub pdv_role: Option<String>,
}

impl SupabaseClaims {
    /// Platform administrators carry `pdv_role = "admin"` in app metadata.
    pub fn is_admin(&self) -> bool {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.pdv_role.as_deref())
            == Some("admin")
    }
}

/// Validates Supabase-issued access tokens
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate and decode a token.
    /// Explicit algorithm and audience validation prevents confusion attacks.
    pub fn validate(&self, token: &str) -> Result<SupabaseClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance
        // Supabase uses "authenticated" as the audience
        validation.set_audience(&["authenticated"]);

        decode::<SupabaseClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    tracing::warn!("JWT audience validation failed - rejecting token");
                    JwtError::Invalid
                }
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token validation failed: {0}")]
    Validation(String),
}
