// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # LTPA token codec
//!
//! [`LtpaToken`] signs, encrypts, decrypts and verifies a single token against
//! one [`KeyMaterial`]. The lifecycle is tracked by an explicit state:
//!
//! ```text
//! mint:   Fresh --sign--> Signed --encrypt--> Encrypted
//! decode: wire bytes --decrypt--> Decrypted --verify--> Verified
//! ```
//!
//! Any change to the attributes drops the token back to `Fresh`, and
//! [`LtpaToken::to_bytes`] signs and encrypts again on demand.
//!
//! ## Payload layout
//!
//! ```text
//! AES-CBC( utf8(canonical user data) ++ low-byte("%" + expiration + "%" + base64(signature)) )
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};

use crate::error::{LtpaError, Result};
use crate::ltpa::crypto;
use crate::ltpa::keys::KeyMaterial;
use crate::ltpa::tokenizer::{self, TOKEN_DELIM};
use crate::ltpa::user_data::{UserData, EXPIRATION_KEY, UNIQUE_ID_KEY};

/// Format version of the tokens produced by this codec
pub const TOKEN_VERSION: i16 = 1;

/// Default tolerance between the signed and the out-of-band expiration
pub const DEFAULT_CLOCK_SKEW_TOLERANCE_MS: i64 = 3_000;

#[derive(Debug, Clone)]
enum TokenState {
    /// Minted or modified, nothing computed yet
    Fresh,
    Signed { signature: Vec<u8> },
    Encrypted { signature: Vec<u8>, encrypted: Vec<u8> },
    /// Recovered from wire bytes, signature not yet checked
    Decrypted { signature: Vec<u8>, encrypted: Vec<u8> },
    Verified { signature: Vec<u8>, encrypted: Vec<u8> },
}

impl TokenState {
    fn name(&self) -> &'static str {
        match self {
            TokenState::Fresh => "fresh",
            TokenState::Signed { .. } => "signed",
            TokenState::Encrypted { .. } => "encrypted",
            TokenState::Decrypted { .. } => "decrypted",
            TokenState::Verified { .. } => "verified",
        }
    }

    fn signature(&self) -> Option<&[u8]> {
        match self {
            TokenState::Fresh => None,
            TokenState::Signed { signature }
            | TokenState::Encrypted { signature, .. }
            | TokenState::Decrypted { signature, .. }
            | TokenState::Verified { signature, .. } => Some(signature),
        }
    }

    fn encrypted(&self) -> Option<&[u8]> {
        match self {
            TokenState::Encrypted { encrypted, .. }
            | TokenState::Decrypted { encrypted, .. }
            | TokenState::Verified { encrypted, .. } => Some(encrypted),
            _ => None,
        }
    }
}

/// A single LTPA token bound to one key set
#[derive(Debug)]
pub struct LtpaToken {
    user_data: UserData,
    expiration_millis: i64,
    keys: Arc<KeyMaterial>,
    state: TokenState,
}

impl LtpaToken {
    /// Mint a fresh token for `unique_id` expiring at `expiration_millis`
    ///
    /// The expiration is also stored as the signed `expire` attribute.
    pub fn new(unique_id: &str, expiration_millis: i64, keys: Arc<KeyMaterial>) -> Result<Self> {
        if unique_id.is_empty() {
            return Err(LtpaError::creation("a unique id is required"));
        }
        let mut user_data = UserData::new(unique_id);
        user_data.check_encodable()?;
        user_data.add_attribute(EXPIRATION_KEY, &expiration_millis.to_string());
        Ok(Self {
            user_data,
            expiration_millis,
            keys,
            state: TokenState::Fresh,
        })
    }

    /// Decrypt wire bytes with `keys` and recover the token fields
    ///
    /// The signature is extracted but not checked; call [`LtpaToken::verify`].
    pub fn decrypt(
        token_bytes: &[u8],
        keys: Arc<KeyMaterial>,
        clock_skew_tolerance_ms: i64,
    ) -> Result<Self> {
        let plaintext = crypto::decrypt(keys.shared_key(), token_bytes)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| LtpaError::invalid("token payload is not valid text"))?;
        let fields = tokenizer::split_token(&plaintext)?;

        let user_data = UserData::parse(fields.user_data)?;
        let signature = STANDARD
            .decode(fields.signature)
            .map_err(|_| LtpaError::invalid("token signature is not valid base64"))?;

        let signed_expiration = match user_data.attributes(EXPIRATION_KEY) {
            Some(values) => Some(parse_millis(values.last().map(String::as_str))?),
            None => None,
        };
        let legacy_expiration = match fields.expiration {
            Some(raw) => Some(parse_millis(Some(raw))?),
            None => None,
        };
        let expiration_millis =
            reconcile_expiration(signed_expiration, legacy_expiration, clock_skew_tolerance_ms)?;

        Ok(Self {
            user_data,
            expiration_millis,
            keys,
            state: TokenState::Decrypted {
                signature,
                encrypted: token_bytes.to_vec(),
            },
        })
    }

    /// Sign the canonical user data with the private key
    ///
    /// Fails with [`LtpaError::TokenCreationFailed`] when an attribute name or
    /// value ends with a backslash.
    pub fn sign(&mut self) -> Result<()> {
        self.user_data.check_encodable()?;
        let signature = crypto::sign(
            self.keys.private_key(),
            self.user_data.canonical_string().as_bytes(),
        )?;
        self.state = TokenState::Signed { signature };
        Ok(())
    }

    /// Encrypt the signed payload with the shared key
    ///
    /// Fails with [`LtpaError::IllegalState`] when the token is not signed.
    /// Tokens that already hold encrypted bytes are left untouched.
    pub fn encrypt(&mut self) -> Result<()> {
        let signature = match &self.state {
            TokenState::Fresh => return Err(LtpaError::IllegalState("encrypt called before sign")),
            TokenState::Signed { signature } => signature.clone(),
            _ => return Ok(()),
        };

        let trailer = format!(
            "{delim}{}{delim}{}",
            self.expiration_millis,
            STANDARD.encode(&signature),
            delim = TOKEN_DELIM
        );
        let mut payload = self.user_data.canonical_string().as_bytes().to_vec();
        payload.extend_from_slice(&tokenizer::simple_encode(&trailer));

        let encrypted = crypto::encrypt(self.keys.shared_key(), &payload)?;
        debug!("Encrypted LTPA token ({} bytes)", encrypted.len());
        self.state = TokenState::Encrypted {
            signature,
            encrypted,
        };
        Ok(())
    }

    /// Check the signature against the user data recovered from the payload
    pub fn verify(&mut self) -> Result<()> {
        let signature = match &self.state {
            TokenState::Verified { .. } => return Ok(()),
            TokenState::Decrypted { signature, .. } | TokenState::Encrypted { signature, .. } => {
                signature
            }
            _ => {
                return Err(LtpaError::IllegalState(
                    "verify called on a token that was never encrypted",
                ))
            }
        };
        crypto::verify(
            self.keys.public_key(),
            self.user_data.canonical_string().as_bytes(),
            signature,
        )?;

        if let TokenState::Decrypted {
            signature,
            encrypted,
        }
        | TokenState::Encrypted {
            signature,
            encrypted,
        } = std::mem::replace(&mut self.state, TokenState::Fresh)
        {
            self.state = TokenState::Verified {
                signature,
                encrypted,
            };
        }
        Ok(())
    }

    /// Fail with [`LtpaError::TokenExpired`] once `now_millis` is past the expiration
    pub fn check_expiration(&self, now_millis: i64) -> Result<()> {
        if now_millis > self.expiration_millis {
            return Err(LtpaError::TokenExpired {
                expired_at: self.expiration_millis,
                now: now_millis,
            });
        }
        Ok(())
    }

    /// Wire bytes of this token, signing and encrypting first if needed
    ///
    /// Repeated calls on an unchanged token return identical bytes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        if let Some(encrypted) = self.state.encrypted() {
            return Ok(encrypted.to_vec());
        }
        if self.state.signature().is_none() {
            self.sign()?;
        }
        self.encrypt()?;
        self.state
            .encrypted()
            .map(<[u8]>::to_vec)
            .ok_or(LtpaError::IllegalState("token has no encrypted form"))
    }

    /// Add an attribute, invalidating any signature and encrypted bytes
    pub fn add_attribute(&mut self, key: &str, value: &str) -> Option<Vec<String>> {
        if key == UNIQUE_ID_KEY && self.user_data.unique_id().is_some() {
            return self.user_data.add_attribute(key, value);
        }
        self.state = TokenState::Fresh;
        self.user_data.add_attribute(key, value)
    }

    /// Strip attributes from the user data
    ///
    /// When anything was removed the token must be signed again before it is
    /// serialized.
    pub fn remove_attributes<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.user_data.remove_attributes(keys) {
            self.state = TokenState::Fresh;
        }
    }

    pub fn attributes(&self, key: &str) -> Option<&[String]> {
        self.user_data.attributes(key)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.user_data.attribute_names()
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.user_data.unique_id()
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub(crate) fn into_user_data(self) -> UserData {
        self.user_data
    }

    pub fn expiration_millis(&self) -> i64 {
        self.expiration_millis
    }

    pub fn key_material(&self) -> &Arc<KeyMaterial> {
        &self.keys
    }

    pub fn version(&self) -> i16 {
        TOKEN_VERSION
    }

    pub fn is_signed(&self) -> bool {
        self.state.signature().is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.state.encrypted().is_some()
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.state, TokenState::Verified { .. })
    }

    /// Name of the current lifecycle state, for diagnostics
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

impl Clone for LtpaToken {
    /// The copy starts fresh and is signed and encrypted again on demand
    fn clone(&self) -> Self {
        Self {
            user_data: self.user_data.clone(),
            expiration_millis: self.expiration_millis,
            keys: Arc::clone(&self.keys),
            state: TokenState::Fresh,
        }
    }
}

fn parse_millis(raw: Option<&str>) -> Result<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| LtpaError::invalid("token expiration is not a number"))
}

/// Pick the expiration of a decrypted token
///
/// The signed attribute is bound to the signature and always wins over the
/// out-of-band field.
fn reconcile_expiration(
    signed: Option<i64>,
    legacy: Option<i64>,
    clock_skew_tolerance_ms: i64,
) -> Result<i64> {
    match (signed, legacy) {
        (Some(signed), Some(legacy)) => {
            if signed.abs_diff(legacy) > clock_skew_tolerance_ms.max(0).unsigned_abs() {
                warn!(
                    "Signed token expiration {} differs from out-of-band expiration {} by more than {} ms, using the signed value",
                    signed, legacy, clock_skew_tolerance_ms
                );
            }
            Ok(signed)
        }
        (Some(signed), None) => Ok(signed),
        (None, Some(legacy)) => Ok(legacy),
        (None, None) => Err(LtpaError::invalid("token carries no expiration")),
    }
}
