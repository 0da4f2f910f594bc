//! Optional on-disk configuration, loaded from the platform's standard
//! config directory. Entirely optional: every field has a sensible default
//! and the CLI works with no config file at all.

use std::fs;

use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default baud rate for the bootloader/application serial link.
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial device path to use when `-d`/`--device` is not given.
    pub default_device: Option<String>,
    /// Default overall deadline in seconds, overriding the engine's
    /// built-in 10-second default under `--firmware`.
    pub default_timeout_secs: Option<u64>,
    /// Baud rate for the serial link, overriding [`DEFAULT_BAUD_RATE`].
    pub default_baud_rate: Option<u32>,
}

impl Config {
    /// Loads `zbflash/config.toml` from the OS config directory, returning
    /// the default (empty) config if none exists.
    pub fn load() -> Result<Self, Error> {
        let Some(dirs) = ProjectDirs::from("", "", "zbflash") else {
            return Ok(Self::default());
        };
        let path = dirs.config_dir().join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }

        debug!("loading configuration from {}", path.display());
        let text = fs::read_to_string(&path).map_err(|e| Error::Config(e.to_string()))?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            default_device = "/dev/ttyACM0"
            default_timeout_secs = 30
            default_baud_rate = 115200
            "#,
        )
        .unwrap();
        assert_eq!(config.default_device.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.default_timeout_secs, Some(30));
        assert_eq!(config.default_baud_rate, Some(115_200));
    }

    #[test]
    fn empty_config_has_no_defaults() {
        let config = Config::default();
        assert!(config.default_device.is_none());
    }
}
