// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use log::debug;

use rust_ltpa::config::{utils, Config};
use rust_ltpa::ltpa::{LtpaTokenFactory, TokenBytes, TokenService, ValidatedToken};

/// Create and validate LTPA tokens
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to configuration file
    #[clap(short, long, default_value = "ltpa.yaml", global = true)]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint a token with the primary key set
    Create {
        /// Unique id of the identity
        #[clap(short, long)]
        user: String,

        /// Token lifetime in minutes (overrides config)
        #[clap(short, long)]
        lifetime: Option<i64>,

        /// Extra attribute as key=value, may be repeated
        #[clap(short, long = "attribute", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Only print the token
        #[clap(short, long)]
        quiet: bool,
    },
    /// Validate a Base64 token against every configured key set
    Validate {
        /// Base64 encoded token
        #[clap(short, long)]
        token: String,

        /// Attribute to drop from the output, may be repeated
        #[clap(short, long = "strip")]
        strip: Vec<String>,
    },
    /// Print the configuration JSON schema
    Schema,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_factory(path: &Path) -> Result<(Config, LtpaTokenFactory)> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    let ring = Arc::new(config.ltpa.key_ring()?);
    let factory = config.ltpa.token_factory(ring);
    debug!("Token factory ready: {:?}", factory);
    Ok((config, factory))
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Create {
            user,
            lifetime,
            attributes,
            quiet,
        } => {
            let (config, factory) = load_factory(&args.config)?;
            let lifetime = lifetime.unwrap_or(config.ltpa.expiration_minutes);
            let attributes: Vec<(&str, &str)> = attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            let token = factory
                .create_token_with_attributes(&user, lifetime, &attributes)
                .context("Failed to create token")?;
            if quiet {
                print!("{}", token.to_base64());
            } else {
                println!("Token created for {}", user);
                println!("Lifetime: {} minutes", lifetime);
                println!("Token: {}", token.to_base64());
            }
        }
        Command::Validate { token, strip } => {
            let (_, factory) = load_factory(&args.config)?;
            let bytes = TokenBytes::from_base64(&token)?;
            let strip: Vec<&str> = strip.iter().map(String::as_str).collect();
            let validated = factory
                .validate_token(bytes.as_bytes(), &strip)
                .context("Token rejected")?;
            print_validated(&validated);
        }
        Command::Schema => utils::output_config_schema()?,
    }

    Ok(())
}

fn print_validated(validated: &ValidatedToken) {
    println!("Unique id: {}", validated.unique_id());
    match Utc.timestamp_millis_opt(validated.expiration_millis()).single() {
        Some(expires) => println!("Expires: {}", expires.to_rfc3339()),
        None => println!("Expires: {} ms", validated.expiration_millis()),
    }
    for (key, values) in validated.attributes() {
        println!("{}: {}", key, values.join(", "));
    }
}
