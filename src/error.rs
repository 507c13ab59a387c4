// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for token creation and validation
//!
//! Every failure inside a single key set attempt (cipher, digest, parsing)
//! collapses into [`LtpaError::InvalidToken`]. Only [`LtpaError::TokenExpired`]
//! stops the multi-key search early.

use thiserror::Error;

/// Errors raised by the LTPA token subsystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LtpaError {
    #[error("Token creation failed: {reason}")]
    TokenCreationFailed { reason: String },

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    /// Both timestamps are milliseconds since the Unix epoch
    #[error("Token expired at {expired_at} (current time {now})")]
    TokenExpired { expired_at: i64, now: i64 },

    #[error("Invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },

    #[error("Illegal token state: {0}")]
    IllegalState(&'static str),
}

impl LtpaError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        LtpaError::InvalidToken {
            reason: reason.into(),
        }
    }

    pub(crate) fn creation(reason: impl Into<String>) -> Self {
        LtpaError::TokenCreationFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn key_material(reason: impl Into<String>) -> Self {
        LtpaError::InvalidKeyMaterial {
            reason: reason.into(),
        }
    }

    /// True for the only error kind that ends a multi-key validation search
    pub fn is_expired(&self) -> bool {
        matches!(self, LtpaError::TokenExpired { .. })
    }
}

/// Result alias used throughout the token subsystem
pub type Result<T> = std::result::Result<T, LtpaError>;
