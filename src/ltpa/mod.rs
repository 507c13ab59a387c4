// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # LTPA token subsystem
//!
//! Leaf-first:
//!
//! - [`tokenizer`]: escaped-field encoding of attribute multimaps and token fields
//! - [`user_data`]: the identity attribute multimap and its canonical form
//! - [`crypto`]: RSA signatures and the AES-CBC payload cipher
//! - [`keys`]: key sets, the [`KeySource`] trait and the rotating [`KeyRing`]
//! - [`token`]: the per-token sign/encrypt/decrypt/verify state machine
//! - [`factory`]: token creation and multi-key validation

pub mod crypto;
pub mod factory;
pub mod keys;
pub mod token;
pub mod tokenizer;
pub mod user_data;

pub use factory::{LtpaTokenFactory, TokenBytes, TokenService, ValidatedToken};
pub use keys::{KeyMaterial, KeyRing, KeySource, ValidationPool};
pub use token::LtpaToken;
pub use user_data::UserData;
