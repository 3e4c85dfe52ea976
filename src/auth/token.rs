//! Compact token codec.
//!
//! Signed tokens are HS256 JWS values produced with `jsonwebtoken`. Encrypted tokens
//! are JWE compact serializations using direct key agreement (`alg: dir`) and
//! `A256GCM` content encryption, with the encoded protected header as AAD:
//!
//! ```text
//! BASE64URL(header) . "" . BASE64URL(iv) . BASE64URL(ciphertext) . BASE64URL(tag)
//! ```
//!
//! Both kinds carry the registered `iat`/`exp` claims next to the caller's payload.
//! Expiry is checked without leeway.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

pub const MIN_SIGNING_KEY_LEN: usize = 32;
pub const ENCRYPTION_KEY_LEN: usize = 32;

const JWE_HEADER: &str = r#"{"alg":"dir","enc":"A256GCM","typ":"JWT"}"#;
const JWE_IV_LEN: usize = 12;
const JWE_TAG_LEN: usize = 16;

/// Reasons a token is rejected or cannot be produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token integrity check failed")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Key material problems, detected once at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("signing key must be at least 32 bytes")]
    SigningKeyTooShort,

    #[error("encryption key must be exactly 32 bytes, got {0}")]
    EncryptionKeyLength(usize),
}

/// Registered claims plus a caller-defined payload flattened next to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims<T> {
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Claims<T> {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// A serialized token together with the claims it carries.
#[derive(Clone)]
pub struct Token<T> {
    pub value: String,
    pub claims: Claims<T>,
}

impl<T: fmt::Debug> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[redacted]")
            .field("claims", &self.claims)
            .finish()
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the process signing and encryption keys.
    ///
    /// # Errors
    /// Returns `KeyError` if the signing key is shorter than 32 bytes or the
    /// encryption key is not exactly 32 bytes.
    pub fn new(signing_key: &SecretString, encryption_key: &SecretString) -> Result<Self, KeyError> {
        let signing = signing_key.expose_secret().as_bytes();
        if signing.len() < MIN_SIGNING_KEY_LEN {
            return Err(KeyError::SigningKeyTooShort);
        }

        let encryption = encryption_key.expose_secret().as_bytes();
        if encryption.len() != ENCRYPTION_KEY_LEN {
            return Err(KeyError::EncryptionKeyLength(encryption.len()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(signing),
            decoding: DecodingKey::from_secret(signing),
            validation,
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(encryption)),
        })
    }

    /// Sign `payload` into a JWS that expires at `expires_at`.
    ///
    /// # Errors
    /// Returns `TokenError::Encoding` if the claims cannot be serialized.
    pub fn sign<T: Serialize>(
        &self,
        payload: T,
        expires_at: DateTime<Utc>,
    ) -> Result<Token<T>, TokenError> {
        let claims = issue_claims(payload, expires_at);
        let value = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Encoding(err.to_string()))?;
        Ok(Token { value, claims })
    }

    /// Verify a JWS: signature first, then expiry.
    ///
    /// # Errors
    /// `InvalidSignature` for integrity failures, `Expired` past `exp`, `Malformed`
    /// for anything that does not parse.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<Claims<T>, TokenError> {
        decode::<Claims<T>>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| map_jwt_error(err.kind()))
    }

    /// Encrypt `payload` into a JWE that expires at `expires_at`.
    ///
    /// # Errors
    /// Returns `TokenError::Encoding` if serialization or encryption fails.
    pub fn encrypt<T: Serialize>(
        &self,
        payload: T,
        expires_at: DateTime<Utc>,
    ) -> Result<Token<T>, TokenError> {
        let claims = issue_claims(payload, expires_at);
        let plaintext =
            serde_json::to_vec(&claims).map_err(|err| TokenError::Encoding(err.to_string()))?;

        let header = Base64UrlUnpadded::encode_string(JWE_HEADER.as_bytes());
        let iv = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(
                &iv,
                Payload {
                    msg: &plaintext,
                    aad: header.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Encoding("content encryption failed".to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - JWE_TAG_LEN);

        let value = format!(
            "{header}..{}.{}.{}",
            Base64UrlUnpadded::encode_string(&iv),
            Base64UrlUnpadded::encode_string(ciphertext),
            Base64UrlUnpadded::encode_string(tag),
        );
        Ok(Token { value, claims })
    }

    /// Decrypt a JWE produced by [`TokenCodec::encrypt`].
    ///
    /// # Errors
    /// Same taxonomy as [`TokenCodec::verify`]; a failed GCM tag check is
    /// `InvalidSignature`.
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> Result<Claims<T>, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(encrypted_key), Some(iv), Some(ciphertext), Some(tag), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        check_jwe_header(header)?;
        if !encrypted_key.is_empty() {
            return Err(TokenError::Malformed);
        }

        let iv = decode_segment(iv)?;
        let tag = decode_segment(tag)?;
        if iv.len() != JWE_IV_LEN || tag.len() != JWE_TAG_LEN {
            return Err(TokenError::Malformed);
        }
        let mut sealed = decode_segment(ciphertext)?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: header.as_bytes(),
                },
            )
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: Claims<T> =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::Malformed)?;
        if claims.exp < Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn issue_claims<T>(payload: T, expires_at: DateTime<Utc>) -> Claims<T> {
    Claims {
        iat: Utc::now().timestamp(),
        exp: expires_at.timestamp(),
        payload,
    }
}

fn map_jwt_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::Malformed)
}

#[derive(Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
}

fn check_jwe_header(segment: &str) -> Result<(), TokenError> {
    let raw = decode_segment(segment)?;
    let header: JweHeader = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
    if header.alg == "dir" && header.enc == "A256GCM" {
        Ok(())
    } else {
        Err(TokenError::Malformed)
    }
}
