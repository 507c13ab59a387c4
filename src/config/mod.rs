// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Configuration Management
//!
//! Loading, validating, and saving the LTPA configuration. The configuration is
//! backed by a YAML file and validated against an embedded JSON schema before
//! it is deserialized.
//!
//! ## Configuration Structure
//!
//! - `ltpa`: token lifetime, clock skew tolerance, the primary key set and the
//!   validation key sets
//!
//! Key material is stored Base64 encoded: the shared key as raw bytes, the RSA
//! keys as PEM text (PKCS#1 or PKCS#8).
//!
//! ## Usage
//!
//! ```no_run
//! use rust_ltpa::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let config = Config::from_file(Path::new("ltpa.yaml")).unwrap();
//! let ring = config.ltpa.key_ring().unwrap();
//! println!("Token lifetime: {} minutes", config.ltpa.expiration_minutes);
//! ```

mod ltpa;
pub mod utils;

pub use ltpa::{KeySetConfig, LtpaConfig};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

/// Embedded JSON schema for the configuration file
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// Deserialized from and serialized to YAML. Sections missing from the file
/// fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LTPA token settings and key sets
    #[serde(default)]
    pub ltpa: LtpaConfig,
}

impl Config {
    /// Write a `*.sample.yaml` file with default values next to `path`
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(err) = utils::validate_against_schema(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            return Err(err);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Check an in-memory configuration with the same rules as [`Config::from_file`]
    pub fn validate(&self) -> Result<()> {
        let json_value =
            serde_json::to_value(self).context("Failed to convert configuration to JSON")?;
        utils::validate_against_schema(&json_value)?;
        utils::validate_specific_rules(self)
    }
}
