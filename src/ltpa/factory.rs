// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Token factory and multi-key validator
//!
//! [`LtpaTokenFactory`] mints tokens with the primary key set and validates
//! incoming tokens against the primary key set first, then against every
//! usable entry of the validation pool in configured order.
//!
//! Each attempt is a full decrypt, verify and expiration check:
//!
//! - success ends the search immediately;
//! - [`LtpaError::TokenExpired`] ends the search immediately, because a key set
//!   already recognized the token;
//! - [`LtpaError::InvalidToken`] moves on to the next key set, remembering the
//!   error so the final failure can report it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rust_ltpa::ltpa::factory::{LtpaTokenFactory, TokenService};
//! use rust_ltpa::ltpa::keys::{KeyMaterial, KeyRing};
//!
//! let ring = Arc::new(KeyRing::with_keys(Some(KeyMaterial::generate(2048).unwrap()), vec![]));
//! let factory = LtpaTokenFactory::new(ring);
//!
//! let token = factory.create_token("user:realm/alice", 120).unwrap();
//! let validated = factory.validate_token(token.as_bytes(), &[]).unwrap();
//! assert_eq!(validated.unique_id(), "user:realm/alice");
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use log::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{LtpaError, Result};
use crate::ltpa::keys::{KeyMaterial, KeySource};
use crate::ltpa::token::{LtpaToken, DEFAULT_CLOCK_SKEW_TOLERANCE_MS};
use crate::ltpa::user_data::{EXPIRATION_KEY, UNIQUE_ID_KEY};

const MILLIS_PER_MINUTE: i64 = 60 * 1000;

/// Encrypted token as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBytes(Vec<u8>);

impl TokenBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Standard Base64, the form used in cookies and headers
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|_| LtpaError::invalid("token is not valid base64"))
    }
}

impl From<Vec<u8>> for TokenBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for TokenBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identity recovered from a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    unique_id: String,
    expiration_millis: i64,
    attributes: IndexMap<String, Vec<String>>,
}

impl ValidatedToken {
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn expiration_millis(&self) -> i64 {
        self.expiration_millis
    }

    /// Attributes other than the unique id and the expiration
    pub fn attributes(&self) -> &IndexMap<String, Vec<String>> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&[String]> {
        self.attributes.get(key).map(Vec::as_slice)
    }

    pub fn into_parts(self) -> (String, IndexMap<String, Vec<String>>) {
        (self.unique_id, self.attributes)
    }
}

/// Create and validate tokens
pub trait TokenService: Send + Sync {
    /// Mint a token for `unique_id` valid for `lifetime_minutes`
    fn create_token(&self, unique_id: &str, lifetime_minutes: i64) -> Result<TokenBytes> {
        self.create_token_with_attributes(unique_id, lifetime_minutes, &[])
    }

    /// Mint a token carrying extra attributes; repeated names become multi-valued
    fn create_token_with_attributes(
        &self,
        unique_id: &str,
        lifetime_minutes: i64,
        attributes: &[(&str, &str)],
    ) -> Result<TokenBytes>;

    /// Validate token bytes, dropping `attributes_to_strip` once the signature holds
    fn validate_token(&self, token: &[u8], attributes_to_strip: &[&str]) -> Result<ValidatedToken>;
}

/// Token service backed by a [`KeySource`]
pub struct LtpaTokenFactory {
    key_source: Arc<dyn KeySource>,
    clock: Arc<dyn Clock>,
    clock_skew_tolerance_ms: i64,
}

impl LtpaTokenFactory {
    pub fn new(key_source: Arc<dyn KeySource>) -> Self {
        Self {
            key_source,
            clock: Arc::new(SystemClock),
            clock_skew_tolerance_ms: DEFAULT_CLOCK_SKEW_TOLERANCE_MS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_clock_skew_tolerance(mut self, tolerance_ms: i64) -> Self {
        self.clock_skew_tolerance_ms = tolerance_ms;
        self
    }

    pub fn key_source(&self) -> &Arc<dyn KeySource> {
        &self.key_source
    }

    /// Mint a token object without serializing it
    pub fn create_ltpa_token(
        &self,
        unique_id: &str,
        lifetime_minutes: i64,
        attributes: &[(&str, &str)],
    ) -> Result<LtpaToken> {
        if unique_id.is_empty() {
            return Err(LtpaError::creation("a unique id is required"));
        }
        if lifetime_minutes <= 0 {
            return Err(LtpaError::creation("token lifetime must be positive"));
        }
        if let Some((key, _)) = attributes
            .iter()
            .find(|(key, _)| *key == UNIQUE_ID_KEY || *key == EXPIRATION_KEY)
        {
            return Err(LtpaError::creation(format!(
                "attribute '{}' is reserved",
                key
            )));
        }
        let keys = self
            .key_source
            .primary_key_material()
            .ok_or_else(|| LtpaError::creation("no primary key set is configured"))?;

        let expiration = self
            .clock
            .now_millis()
            .checked_add(lifetime_minutes.saturating_mul(MILLIS_PER_MINUTE))
            .ok_or_else(|| LtpaError::creation("token lifetime is out of range"))?;

        let mut token = LtpaToken::new(unique_id, expiration, keys)?;
        for (key, value) in attributes {
            token.add_attribute(key, value);
        }
        token.user_data().check_encodable()?;
        Ok(token)
    }

    /// Decrypt, verify and check expiration against a single key set
    fn attempt(&self, token: &[u8], keys: &Arc<KeyMaterial>, now: i64) -> Result<LtpaToken> {
        let mut candidate =
            LtpaToken::decrypt(token, Arc::clone(keys), self.clock_skew_tolerance_ms)?;
        candidate.verify()?;
        candidate.check_expiration(now)?;
        Ok(candidate)
    }

    /// Find a key set that accepts `token`
    pub fn validate_ltpa_token(&self, token: &[u8]) -> Result<LtpaToken> {
        let now = self.clock.now_millis();
        let mut last_error: Option<LtpaError> = None;
        let mut attempted = false;

        if let Some(primary) = self.key_source.primary_key_material() {
            attempted = true;
            match self.attempt(token, &primary, now) {
                Ok(validated) => return Ok(validated),
                Err(e) if e.is_expired() => return Err(e),
                Err(e) => {
                    debug!("Primary key set rejected token: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let pool = self.key_source.validation_pool();
        let mut retired_seen = false;
        for keys in pool.iter() {
            if keys.is_expired(now) {
                retired_seen = true;
                continue;
            }
            attempted = true;
            match self.attempt(token, keys, now) {
                Ok(validated) => {
                    debug!("Token accepted by a validation key set");
                    if retired_seen {
                        self.key_source.evict_expired(now);
                    }
                    return Ok(validated);
                }
                Err(e) if e.is_expired() => {
                    if retired_seen {
                        self.key_source.evict_expired(now);
                    }
                    return Err(e);
                }
                Err(e) => {
                    debug!("Validation key set rejected token: {}", e);
                    last_error = Some(e);
                }
            }
        }
        if retired_seen {
            self.key_source.evict_expired(now);
        }

        Err(match last_error {
            Some(LtpaError::InvalidToken { reason }) => LtpaError::invalid(format!(
                "no configured key set accepted the token: {}",
                reason
            )),
            Some(other) => other,
            None if !attempted => LtpaError::invalid("no LTPA key set is configured"),
            None => LtpaError::invalid("no configured key set accepted the token"),
        })
    }
}

impl TokenService for LtpaTokenFactory {
    fn create_token_with_attributes(
        &self,
        unique_id: &str,
        lifetime_minutes: i64,
        attributes: &[(&str, &str)],
    ) -> Result<TokenBytes> {
        let mut token = self.create_ltpa_token(unique_id, lifetime_minutes, attributes)?;
        let bytes = token.to_bytes().map_err(|e| match e {
            LtpaError::TokenCreationFailed { .. } => e,
            other => LtpaError::creation(other.to_string()),
        })?;
        debug!(
            "Created LTPA token expiring at {}",
            token.expiration_millis()
        );
        Ok(TokenBytes(bytes))
    }

    fn validate_token(&self, token: &[u8], attributes_to_strip: &[&str]) -> Result<ValidatedToken> {
        let validated = self.validate_ltpa_token(token)?;
        let expiration_millis = validated.expiration_millis();

        let mut user_data = validated.into_user_data();
        let unique_id = user_data
            .unique_id()
            .map(str::to_owned)
            .ok_or_else(|| LtpaError::invalid("token carries no unique id"))?;
        user_data.remove_attributes(
            attributes_to_strip
                .iter()
                .copied()
                .chain([UNIQUE_ID_KEY, EXPIRATION_KEY]),
        );

        Ok(ValidatedToken {
            unique_id,
            expiration_millis,
            attributes: user_data.into_attributes(),
        })
    }
}

impl std::fmt::Debug for LtpaTokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LtpaTokenFactory")
            .field("clock_skew_tolerance_ms", &self.clock_skew_tolerance_ms)
            .finish_non_exhaustive()
    }
}
