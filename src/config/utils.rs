// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema access and the validation rules that JSON schema cannot express.

use anyhow::{Context, Result};
use log::debug;

use super::{Config, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// # Example
///
/// ```bash
/// ./ltpa_token schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validate a JSON document against the embedded configuration schema
pub fn validate_against_schema(json_value: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let validator = jsonschema::draft202012::options()
        .should_validate_formats(true)
        .build(&schema)?;

    if let Err(error) = validator.validate(json_value) {
        anyhow::bail!("Configuration validation failed: {}", error);
    }
    Ok(())
}

/// Validates the configuration against rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Key decoding**: every key set must decode: Base64 shared key of at least
///   16 bytes, Base64 PEM RSA keys
/// - **Lifetime**: `expiration_minutes` must be positive
/// - **Tolerance**: `clock_skew_tolerance_ms` must not be negative
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.ltpa.expiration_minutes <= 0 {
        anyhow::bail!(
            "Invalid token lifetime: {} minutes",
            config.ltpa.expiration_minutes
        );
    }

    if config.ltpa.clock_skew_tolerance_ms < 0 {
        anyhow::bail!(
            "Invalid clock skew tolerance: {} ms",
            config.ltpa.clock_skew_tolerance_ms
        );
    }

    if let Some(primary) = &config.ltpa.primary_keys {
        primary
            .to_key_material()
            .context("Primary key set is invalid")?;
    }

    for (index, keys) in config.ltpa.validation_keys.iter().enumerate() {
        keys.to_key_material()
            .with_context(|| format!("Validation key set #{} is invalid", index + 1))?;
    }

    Ok(())
}
