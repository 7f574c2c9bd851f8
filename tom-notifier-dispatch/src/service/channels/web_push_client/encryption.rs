//!
//! `aes128gcm` content encoding of Web Push messages (RFC 8188, RFC 8291).
//! Payload always fits in a single record.
//!

use aes_gcm::{aead::Aead, Aes128Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hkdf::Hkdf;
use p256::{ecdh::EphemeralSecret, elliptic_curve::sec1::ToEncodedPoint, PublicKey};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

pub const PUBLIC_KEY_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;
const SALT_LEN: usize = 16;
const RECORD_SIZE: u32 = 4096;

const IKM_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";
const LAST_RECORD_DELIMITER: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("invalid subscription key: {0}")]
    InvalidKey(&'static str),

    #[error("encryption failed: {0}")]
    Crypto(&'static str),
}

pub fn decode_b64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input.trim_end_matches('=').as_bytes())
}

pub fn encode_b64url(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

///
/// Encrypts payload for subscription with user agent key `p256dh` and `auth` secret,
/// both base64url encoded.
/// Returns `aes128gcm` body: header block carrying salt and sender key, then the single record.
///
pub fn encrypt(plaintext: &[u8], p256dh: &str, auth: &str) -> Result<Vec<u8>, EncryptionError> {
    let remote_public_key_raw = decode_b64url(p256dh)
        .map_err(|_| EncryptionError::InvalidKey("p256dh is not base64url"))?;
    let auth_secret =
        decode_b64url(auth).map_err(|_| EncryptionError::InvalidKey("auth is not base64url"))?;
    if remote_public_key_raw.len() != PUBLIC_KEY_LEN {
        return Err(EncryptionError::InvalidKey("p256dh has invalid length"));
    }
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(EncryptionError::InvalidKey("auth has invalid length"));
    }
    let remote_public_key = PublicKey::from_sec1_bytes(&remote_public_key_raw)
        .map_err(|_| EncryptionError::InvalidKey("p256dh is not a P-256 point"))?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let local_secret = EphemeralSecret::random(&mut OsRng);
    let local_public_key = local_secret.public_key().to_encoded_point(false);
    let local_public_key_raw = local_public_key.as_bytes();
    let shared_secret = local_secret.diffie_hellman(&remote_public_key);

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX);
    ikm_info.extend_from_slice(&remote_public_key_raw);
    ikm_info.extend_from_slice(local_public_key_raw);

    let ikm = hkdf_sha256(&auth_secret, shared_secret.raw_secret_bytes(), &ikm_info, 32)?;
    let cek = hkdf_sha256(&salt, &ikm, CEK_INFO, 16)?;
    let nonce = hkdf_sha256(&salt, &ikm, NONCE_INFO, 12)?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| EncryptionError::Crypto("invalid content encryption key length"))?;
    // first record, sequence number 0 leaves the nonce unchanged
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), record.as_slice())
        .map_err(|_| EncryptionError::Crypto("aes-gcm encryption failed"))?;

    let mut body =
        Vec::with_capacity(SALT_LEN + 4 + 1 + local_public_key_raw.len() + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(local_public_key_raw.len() as u8);
    body.extend_from_slice(local_public_key_raw);
    body.extend_from_slice(&ciphertext);

    Ok(body)
}

pub(super) fn hkdf_sha256(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>, EncryptionError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hkdf.expand(info, &mut okm)
        .map_err(|_| EncryptionError::Crypto("hkdf expand failed"))?;

    Ok(okm)
}
