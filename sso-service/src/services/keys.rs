//! JWK key manager: RSA keypair lifecycle, JWKS publication and RS256
//! sign/verify with kid-based key selection.
//!
//! Keys are never dropped while the process lives, so tokens signed before
//! a rotation still verify.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::services::ServiceError;

const RSA_BITS: usize = 2048;

/// Published JWK (public half only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

struct RetainedKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
    #[allow(dead_code)]
    created_utc: DateTime<Utc>,
}

/// RSA signing-key registry. The newest key signs; every retained key
/// verifies. Read-mostly, guarded by a RwLock.
pub struct KeyManager {
    keys: RwLock<Vec<RetainedKey>>,
}

impl KeyManager {
    /// Generate the initial signing key.
    pub fn new() -> Result<Self, ServiceError> {
        let manager = Self {
            keys: RwLock::new(Vec::new()),
        };
        manager.rotate()?;
        Ok(manager)
    }

    /// Generate and activate a new signing key. Previously issued tokens
    /// keep verifying against the retained keys.
    pub fn rotate(&self) -> Result<String, ServiceError> {
        let key = generate_retained_key()?;
        let kid = key.kid.clone();
        let mut keys = self.keys.write().expect("key lock poisoned");
        keys.push(key);
        tracing::info!(kid = %kid, retained = keys.len(), "Activated new signing key");
        Ok(kid)
    }

    /// Kid of the currently active signing key.
    pub fn active_kid(&self) -> String {
        let keys = self.keys.read().expect("key lock poisoned");
        keys.last().map(|k| k.kid.clone()).unwrap_or_default()
    }

    /// Every retained public key, current and historical.
    pub fn jwks(&self) -> JwksDocument {
        let keys = self.keys.read().expect("key lock poisoned");
        JwksDocument {
            keys: keys.iter().map(|k| k.jwk.clone()).collect(),
        }
    }

    /// Sign claims as an RS256 JWT with the active key's kid in the header.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, ServiceError> {
        let keys = self.keys.read().expect("key lock poisoned");
        let key = keys
            .last()
            .ok_or_else(|| ServiceError::Crypto("no signing key".into()))?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());
        encode(&header, claims, &key.encoding)
            .map_err(|e| ServiceError::Crypto(format!("failed to sign token: {e}")))
    }

    /// Verify an RS256 JWT against the retained key named by its kid.
    /// Any non-RSA signing method is rejected outright.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, ServiceError> {
        let header = decode_header(token)
            .map_err(|e| ServiceError::Crypto(format!("malformed token header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(ServiceError::Crypto(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ServiceError::Crypto("token has no kid".into()))?;

        let keys = self.keys.read().expect("key lock poisoned");
        let key = keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| ServiceError::Crypto(format!("unknown kid {kid}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Audience binding is checked by callers against their own client
        // registry, not here.
        validation.validate_aud = false;
        decode::<T>(token, &key.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Crypto(format!("token verification failed: {e}")))
    }
}

fn generate_retained_key() -> Result<RetainedKey, ServiceError> {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_BITS)
        .map_err(|e| ServiceError::Crypto(format!("RSA generation failed: {e}")))?;
    let public = private.to_public_key();

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| ServiceError::Crypto(format!("private key encoding failed: {e}")))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| ServiceError::Crypto(format!("public key encoding failed: {e}")))?;

    let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
        .map_err(|e| ServiceError::Crypto(format!("private key parse failed: {e}")))?;
    let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
        .map_err(|e| ServiceError::Crypto(format!("public key parse failed: {e}")))?;

    let mut kid_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut kid_bytes);
    let kid = hex::encode(kid_bytes);

    let jwk = Jwk {
        kty: "RSA".to_string(),
        use_: "sig".to_string(),
        alg: "RS256".to_string(),
        kid: kid.clone(),
        n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
    };

    Ok(RetainedKey {
        kid,
        encoding,
        decoding,
        jwk,
        created_utc: Utc::now(),
    })
}
