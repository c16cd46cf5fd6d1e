// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Config, RawConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks ceilings, regexes and the job header template.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = load_from_path(&path)?;
    let config = Config::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Procsched.toml`, unless `PROCSCHED_CONFIG` is set.
pub fn default_config_path() -> PathBuf {
    std::env::var("PROCSCHED_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("Procsched.toml"))
}
