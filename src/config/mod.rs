//! Configuration loading for the subembed binary.
//!
//! The types live in `subembed_core::config`; this module finds and reads
//! the TOML file.

pub use subembed_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Locations searched when no `--config` is given, in order.
const DEFAULT_PATHS: [&str; 3] = [
    "./subembed.toml",
    "~/.config/subembed/config.toml",
    "/etc/subembed/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Parse TOML text, expand `~` in the storage root, and log validation warnings.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)?;
    prepare(&mut config);
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    prepare(&mut config);
    Ok(config)
}

fn prepare(config: &mut Config) {
    let root = config.storage.root.to_string_lossy().into_owned();
    config.storage.root = PathBuf::from(shellexpand::tilde(&root).as_ref());

    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }
}
