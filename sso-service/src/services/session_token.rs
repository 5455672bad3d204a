//! Stateless login-cookie codec.
//!
//! The `sso_session` cookie value is
//! `base64url(user_id ∥ issued_at ∥ random)` + "." + `base64url(hmac)`.
//! The MAC is verified before any payload field is trusted; a fixed 24h
//! window bounds the token's life. This is the one credential that cannot
//! be revoked individually - invalidating it means rotating the secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use crate::services::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// user_id (16) + unix seconds (8) + random (16)
const PAYLOAD_LEN: usize = 40;
const MAX_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct SessionTokenCodec {
    secret: Vec<u8>,
}

impl SessionTokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Mint a signed session token for the user.
    pub fn generate(&self, user_id: Uuid) -> String {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.extend_from_slice(user_id.as_bytes());
        payload.extend_from_slice(&Utc::now().timestamp().to_be_bytes());
        let mut random = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut random);
        payload.extend_from_slice(&random);

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify and decode a session token, returning the user id.
    ///
    /// The signature check runs first (constant-time, inside the Mac
    /// verifier); only then are the payload fields read and the age window
    /// enforced.
    pub fn parse(&self, token: &str) -> Result<Uuid, ServiceError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(ServiceError::InvalidCredentials)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| ServiceError::InvalidCredentials)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| ServiceError::InvalidCredentials)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| ServiceError::InvalidCredentials)?;

        if payload.len() != PAYLOAD_LEN {
            return Err(ServiceError::InvalidCredentials);
        }

        let user_id = Uuid::from_slice(&payload[..16]).map_err(|_| ServiceError::InvalidCredentials)?;
        let issued_at = i64::from_be_bytes(
            payload[16..24]
                .try_into()
                .map_err(|_| ServiceError::InvalidCredentials)?,
        );

        let age = Utc::now().timestamp() - issued_at;
        if !(0..=MAX_AGE_SECS).contains(&age) {
            return Err(ServiceError::CredentialInvalid);
        }

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SessionTokenCodec {
        SessionTokenCodec::new(b"test-session-secret")
    }

    #[test]
    fn round_trip() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.generate(user_id);
        assert_eq!(codec.parse(&token).unwrap(), user_id);
    }

    #[test]
    fn any_single_byte_mutation_fails() {
        let codec = codec();
        let token = codec.generate(Uuid::new_v4());
        let (payload, signature) = token.split_once('.').unwrap();

        // Flip one byte of the payload.
        let mut raw = URL_SAFE_NO_PAD.decode(payload).unwrap();
        raw[0] ^= 0x01;
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(&raw), signature);
        assert!(codec.parse(&forged).is_err());

        // Flip one byte of the signature.
        let mut sig = URL_SAFE_NO_PAD.decode(signature).unwrap();
        sig[0] ^= 0x01;
        let forged = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(&sig));
        assert!(codec.parse(&forged).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let token = codec().generate(Uuid::new_v4());
        let other = SessionTokenCodec::new(b"rotated-secret");
        assert!(other.parse(&token).is_err());
    }

    #[test]
    fn stale_token_is_expired() {
        let codec = codec();
        // Build a token whose timestamp is 25h in the past, signed with the
        // real secret.
        let user_id = Uuid::new_v4();
        let mut payload = Vec::new();
        payload.extend_from_slice(user_id.as_bytes());
        payload
            .extend_from_slice(&(Utc::now().timestamp() - 25 * 3600).to_be_bytes());
        payload.extend_from_slice(&[0u8; 16]);
        let mut mac = HmacSha256::new_from_slice(b"test-session-secret").unwrap();
        mac.update(&payload);
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        );
        assert!(codec.parse(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec();
        assert!(codec.parse("").is_err());
        assert!(codec.parse("no-dot-here").is_err());
        assert!(codec.parse("a.b").is_err());
    }
}
