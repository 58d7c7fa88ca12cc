// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization (including duration parsing); it
/// does **not** perform semantic validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks scheduler/lock/transport sanity and resolves every `[[policy]]`
///   against the built-in policy registry, so unknown policy types fail here
///   rather than during scheduling.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config path: `Runq.toml` in the current working directory,
/// overridable through `RUNQ_CONFIG`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("RUNQ_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Runq.toml"))
}
