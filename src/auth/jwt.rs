use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

/// JWT claims embedded in access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: account ID as a UUID string.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued-at time (Unix timestamp).
    pub iat: i64,
}

/// Generate an access token for the given account.
///
/// # Errors
///
/// Returns an error if JWT encoding fails.
pub fn generate_access_token(account_id: Uuid, config: &Config) -> anyhow::Result<String> {
    let now = Utc::now();

    #[allow(clippy::cast_possible_wrap)]
    let exp = now.timestamp() + config.jwt_access_expiration_secs as i64;

    let claims = Claims {
        sub: account_id.to_string(),
        exp,
        iat: now.timestamp(),
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| anyhow::anyhow!("Failed to encode access token: {e}"))
}

/// Validate an access token and return its claims.
///
/// # Errors
///
/// Returns an error if the token is invalid or expired.
pub fn validate_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &key, &validation)
        .map_err(|e| anyhow::anyhow!("Invalid access token: {e}"))?;

    Ok(token_data.claims)
}
