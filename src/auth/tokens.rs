use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::identity::Identity;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Claims carried by hosted-auth access tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl AccessClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Sign an access token for `identity`, shaped like the hosted service's tokens.
pub fn mint_access_token(identity: &Identity, ttl: Duration, secret: &str) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: identity.id,
        email: identity.email.clone(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        aud: Some("authenticated".into()),
        role: Some("authenticated".into()),
        user_metadata: UserMetadata {
            name: identity.name.clone(),
        },
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Rejected(format!("failed to sign access token: {e}")))
}

/// Read the claims of an access token without judging its expiry.
///
/// The signature is checked when `secret` is known; otherwise the claims are
/// only decoded, which is enough to schedule a refresh of our own session.
pub fn inspect_access_token(token: &str, secret: Option<&str>) -> Result<AccessClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let key = match secret {
        Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
        None => {
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        }
    };

    decode::<AccessClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// SHA-256 of a raw token, lowercase hex.
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}
