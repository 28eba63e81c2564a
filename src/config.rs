// src/config.rs

//! Configuration loading utilities.
//!
//! This module assembles a [`Config`] from its sources: a TOML file (local
//! or, in Lambda, optionally S3), then environment variable overrides.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
#[cfg(feature = "s3")]
use crate::storage::{DocumentStorage, S3Storage};

/// Load the CLI configuration.
///
/// Falls back to defaults if the file is missing or unreadable, then
/// applies environment overrides. Validation is left to the caller since
/// some commands (`trends`) need only part of the config.
pub fn load_config(path: &Path) -> Config {
    let mut config = if path.exists() {
        Config::load_or_default(path)
    } else {
        log::debug!("No config file at {}, using defaults", path.display());
        Config::default()
    };
    config.apply_env();
    config
}

/// Config loader for the Lambda environment.
///
/// Reads `CONFIG_S3_KEY` from S3 when set (and the `s3` feature is on),
/// else `CONFIG_PATH` from the bundle, else defaults; environment variables
/// override whatever was loaded. The result is validated.
pub async fn load_lambda_config() -> Result<Config> {
    let mut config = load_lambda_base().await?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

async fn load_lambda_base() -> Result<Config> {
    #[cfg(feature = "s3")]
    {
        if let Ok(key) = std::env::var("CONFIG_S3_KEY") {
            let storage = S3Storage::from_env().await?;
            log::info!("Loading config file from {}", storage.describe(&key));
            let bytes = storage
                .read_bytes_optional(&key)
                .await?
                .ok_or_else(|| AppError::config(format!("Config file not found in S3: {key}")))?;
            return parse_toml(&key, bytes);
        }
    }

    match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::load(&path)
            .map_err(|e| AppError::config(format!("Failed to load config from {path}: {e}"))),
        Err(_) => Ok(Config::default()),
    }
}

fn parse_toml(source: &str, bytes: Vec<u8>) -> Result<Config> {
    let text = String::from_utf8(bytes).map_err(|e| {
        AppError::config(format!("Config file {source} is not valid UTF-8: {e}"))
    })?;
    Ok(toml::from_str(&text)?)
}
