//! Host configuration.
//!
//! Provides a mechanism to stand the engine up from a TOML file: device
//! count and parameter set. The engine itself only ever sees the immutable
//! parameter bundle and a stream set built from this.

use crate::device::DeviceStreams;
use crate::parameters::{ParameterError, RadixAccelParameters};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelConfig {
    /// Number of devices the engine may partition batched work across.
    pub device_count: u32,
    pub parameters: RadixAccelParameters,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid TOML in `{path}`: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("config rejected: {0}")]
    InvalidParameters(#[from] ParameterError),
    #[error("config rejected: device count must be at least 1")]
    NoDevices,
}

impl AccelConfig {
    pub fn from_toml(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_count == 0 {
            return Err(ConfigError::NoDevices);
        }
        self.parameters.validate()?;
        Ok(())
    }

    /// Builds the stream set this configuration describes.
    pub fn streams(&self) -> DeviceStreams {
        DeviceStreams::new_multi(self.device_count)
    }
}
