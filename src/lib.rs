// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust LTPA library
//!
//! Lightweight Third-Party Authentication tokens: an identity and its
//! attributes, signed with an RSA key, encrypted with a shared AES key, and
//! validated against a primary key set plus a rotating pool of older key sets.
//!
//! - [`ltpa`]: the token codec, key sets and the token factory
//! - [`config`]: YAML configuration with schema validation
//! - [`clock`]: injectable time source
//! - [`error`]: the error taxonomy

pub mod clock;
pub mod config;
pub mod error;
pub mod ltpa;

pub use error::{LtpaError, Result};
