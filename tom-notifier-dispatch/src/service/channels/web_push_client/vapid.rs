use super::encryption::{decode_b64url, encode_b64url, PUBLIC_KEY_LEN};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use time::OffsetDateTime;
use url::Url;

const JWT_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);
const JWT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum VapidError {
    #[error("invalid vapid key: {0}")]
    InvalidKey(&'static str),

    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("jwt serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

struct CachedJwt {
    jwt: String,
    expires_at: OffsetDateTime,
}

///
/// Application server identification (RFC 8292).
/// Signed ES256 tokens are cached per push service origin.
///
pub struct Vapid {
    public_key: String,
    signing_key: SigningKey,
    subject: String,
    cache: Mutex<HashMap<String, CachedJwt>>,
}

impl Vapid {
    ///
    /// Keys are base64url encoded, public key as uncompressed point
    /// and private key as raw 32 byte scalar.
    ///
    pub fn new(public_key: &str, private_key: &str, subject: String) -> Result<Self, VapidError> {
        let public_key_raw = decode_b64url(public_key)
            .map_err(|_| VapidError::InvalidKey("public key is not base64url"))?;
        if public_key_raw.len() != PUBLIC_KEY_LEN {
            return Err(VapidError::InvalidKey("public key has invalid length"));
        }

        let private_key_raw = decode_b64url(private_key)
            .map_err(|_| VapidError::InvalidKey("private key is not base64url"))?;
        let private_key_raw: [u8; 32] = private_key_raw
            .try_into()
            .map_err(|_| VapidError::InvalidKey("private key has invalid length"))?;
        let signing_key = SigningKey::from_bytes(&private_key_raw.into())
            .map_err(|_| VapidError::InvalidKey("private key is not a P-256 scalar"))?;

        let derived_public_key = signing_key.verifying_key().to_encoded_point(false);
        if derived_public_key.as_bytes() != public_key_raw.as_slice() {
            return Err(VapidError::InvalidKey("public key does not match private key"));
        }

        Ok(Self {
            public_key: encode_b64url(&public_key_raw),
            signing_key,
            subject,
            cache: Mutex::new(HashMap::new()),
        })
    }

    ///
    /// Value of the `Authorization` header for the endpoint.
    ///
    pub fn authorization(&self, endpoint: &str) -> Result<String, VapidError> {
        let audience = push_service_audience(endpoint)?;
        let jwt = self.jwt(&audience, OffsetDateTime::now_utc())?;

        Ok(format!("vapid t={jwt}, k={}", self.public_key))
    }

    fn jwt(&self, audience: &str, now: OffsetDateTime) -> Result<String, VapidError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(audience) {
            if cached.expires_at - JWT_REFRESH_MARGIN > now {
                return Ok(cached.jwt.clone());
            }
        }

        let expires_at = now + JWT_LIFETIME;
        let jwt = self.sign(audience, expires_at)?;
        cache.insert(
            audience.to_string(),
            CachedJwt {
                jwt: jwt.clone(),
                expires_at,
            },
        );

        Ok(jwt)
    }

    fn sign(&self, audience: &str, expires_at: OffsetDateTime) -> Result<String, VapidError> {
        let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
        let claims = Claims {
            aud: audience,
            exp: expires_at.unix_timestamp(),
            sub: &self.subject,
        };

        let signing_input = format!(
            "{}.{}",
            encode_b64url(serde_json::to_string(&header)?.as_bytes()),
            encode_b64url(serde_json::to_string(&claims)?.as_bytes()),
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());

        Ok(format!(
            "{signing_input}.{}",
            encode_b64url(&signature.to_bytes())
        ))
    }
}

///
/// Origin of the push service, used as the JWT audience.
///
pub fn push_service_audience(endpoint: &str) -> Result<String, VapidError> {
    let url = Url::parse(endpoint).map_err(|err| VapidError::InvalidEndpoint(err.to_string()))?;
    if url.host().is_none() {
        return Err(VapidError::InvalidEndpoint("missing host".to_string()));
    }

    Ok(url.origin().ascii_serialization())
}
