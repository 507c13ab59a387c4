// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # LTPA key material
//!
//! A [`KeyMaterial`] bundles the shared secret used by the payload cipher and
//! the RSA key pair used for signatures. Key sets never change after
//! construction; rotation replaces whole sets.
//!
//! [`KeySource`] is the read side consumed by the token factory. [`KeyRing`]
//! is the in-process implementation: the primary key set and the validation
//! pool sit behind `arc-swap` pointers, so validating threads read them
//! without locking while a reload swaps in new snapshots.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rust_ltpa::ltpa::keys::{KeyMaterial, KeyRing, KeySource};
//!
//! let primary = KeyMaterial::generate(2048).unwrap();
//! let retired = KeyMaterial::generate(2048).unwrap();
//!
//! let ring = KeyRing::new();
//! ring.set_primary(Some(Arc::new(primary)));
//! ring.replace_validation_keys(vec![Arc::new(retired)]);
//! assert_eq!(ring.validation_pool().len(), 1);
//! ```

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::rand_core::{OsRng, RngCore};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{LtpaError, Result};
use crate::ltpa::crypto::CIPHER_KEY_LEN;

/// Length of shared keys produced by [`KeyMaterial::generate`]
pub const GENERATED_SHARED_KEY_LEN: usize = 32;

/// One shared key plus RSA key pair, optionally retired after a point in time
#[derive(Clone)]
pub struct KeyMaterial {
    shared_key: Vec<u8>,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    not_usable_after: Option<DateTime<Utc>>,
}

impl KeyMaterial {
    pub fn new(
        shared_key: Vec<u8>,
        private_key: RsaPrivateKey,
        public_key: RsaPublicKey,
        not_usable_after: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if shared_key.len() < CIPHER_KEY_LEN {
            return Err(LtpaError::key_material(format!(
                "shared key must be at least {} bytes, got {}",
                CIPHER_KEY_LEN,
                shared_key.len()
            )));
        }
        Ok(Self {
            shared_key,
            private_key,
            public_key,
            not_usable_after,
        })
    }

    /// Build a key set from PEM encoded RSA keys (PKCS#1 or PKCS#8)
    pub fn from_pem(
        shared_key: Vec<u8>,
        private_key_pem: &str,
        public_key_pem: &str,
        not_usable_after: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(private_key_pem))
            .map_err(|e| LtpaError::key_material(format!("unreadable private key: {}", e)))?;
        let public_key = RsaPublicKey::from_pkcs1_pem(public_key_pem)
            .or_else(|_| RsaPublicKey::from_public_key_pem(public_key_pem))
            .map_err(|e| LtpaError::key_material(format!("unreadable public key: {}", e)))?;
        Self::new(shared_key, private_key, public_key, not_usable_after)
    }

    /// Generate a fresh in-memory key set
    pub fn generate(bits: usize) -> Result<Self> {
        let mut rng = OsRng;
        let mut shared_key = vec![0u8; GENERATED_SHARED_KEY_LEN];
        rng.fill_bytes(&mut shared_key);
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| LtpaError::key_material(format!("RSA key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);
        Self::new(shared_key, private_key, public_key, None)
    }

    /// Copy of this key set retired after `instant`
    pub fn with_not_usable_after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_usable_after = Some(instant);
        self
    }

    pub fn shared_key(&self) -> &[u8] {
        &self.shared_key
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn not_usable_after(&self) -> Option<DateTime<Utc>> {
        self.not_usable_after
    }

    /// True once `now_millis` is past the retirement instant
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.not_usable_after
            .is_some_and(|instant| now_millis > instant.timestamp_millis())
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("shared_key", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("public_key", &"<RsaPublicKey>")
            .field("not_usable_after", &self.not_usable_after)
            .finish()
    }
}

/// Snapshot of the validation pool, in configured order
pub type ValidationPool = Arc<Vec<Arc<KeyMaterial>>>;

/// Where the token factory gets its key sets from
pub trait KeySource: Send + Sync {
    /// Key set used to mint tokens and tried first during validation
    fn primary_key_material(&self) -> Option<Arc<KeyMaterial>>;

    /// Older key sets still accepted for validation
    fn validation_pool(&self) -> ValidationPool;

    /// Drop pool entries retired before `now_millis`
    fn evict_expired(&self, _now_millis: i64) {}
}

impl<K: KeySource + ?Sized> KeySource for Arc<K> {
    fn primary_key_material(&self) -> Option<Arc<KeyMaterial>> {
        (**self).primary_key_material()
    }

    fn validation_pool(&self) -> ValidationPool {
        (**self).validation_pool()
    }

    fn evict_expired(&self, now_millis: i64) {
        (**self).evict_expired(now_millis)
    }
}

/// Copy-on-write holder for the primary key set and the validation pool
pub struct KeyRing {
    primary: ArcSwapOption<KeyMaterial>,
    pool: ArcSwap<Vec<Arc<KeyMaterial>>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self {
            primary: ArcSwapOption::empty(),
            pool: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn with_keys(primary: Option<KeyMaterial>, validation_keys: Vec<KeyMaterial>) -> Self {
        let ring = Self::new();
        ring.set_primary(primary.map(Arc::new));
        ring.replace_validation_keys(validation_keys.into_iter().map(Arc::new).collect());
        ring
    }

    pub fn set_primary(&self, primary: Option<Arc<KeyMaterial>>) {
        debug!(
            "Primary LTPA key set {}",
            if primary.is_some() { "replaced" } else { "cleared" }
        );
        self.primary.store(primary);
    }

    /// Swap in a whole new validation pool
    pub fn replace_validation_keys(&self, keys: Vec<Arc<KeyMaterial>>) {
        debug!("Validation pool replaced with {} key set(s)", keys.len());
        self.pool.store(Arc::new(keys));
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("primary", &self.primary.load().is_some())
            .field("validation_keys", &self.pool.load().len())
            .finish()
    }
}

impl KeySource for KeyRing {
    fn primary_key_material(&self) -> Option<Arc<KeyMaterial>> {
        self.primary.load_full()
    }

    fn validation_pool(&self) -> ValidationPool {
        self.pool.load_full()
    }

    fn evict_expired(&self, now_millis: i64) {
        let mut evicted = 0;
        self.pool.rcu(|current| {
            let kept: Vec<Arc<KeyMaterial>> = current
                .iter()
                .filter(|keys| !keys.is_expired(now_millis))
                .cloned()
                .collect();
            evicted = current.len() - kept.len();
            kept
        });
        if evicted > 0 {
            warn!("Evicted {} retired LTPA validation key set(s)", evicted);
        }
    }
}
