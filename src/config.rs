//! Client configuration loaded from YAML

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::axis::{AxisMapping, Direction};
use crate::objects::{ObjectKind, RequestSet, StreamMode};
use crate::{Result, StreamError};

/// Port capture servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 801;

/// Settings a [`Client`](crate::Client) starts with.
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```rust
/// use mocap_stream::ClientConfig;
///
/// let yaml = "buffer_size: 8\naxis_mapping: [Forward, Left, Up]\n";
/// let config = ClientConfig::from_yaml_str(yaml)?;
/// assert_eq!(config.buffer_size, 8);
/// assert_eq!(config.default_port, mocap_stream::config::DEFAULT_PORT);
/// # Ok::<(), mocap_stream::StreamError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Frames kept before the oldest is dropped
    pub buffer_size: usize,
    pub stream_mode: StreamMode,
    pub connect_timeout_ms: u64,
    /// Kinds requested from every connection
    pub request_types: RequestSet,
    /// Directions of the X, Y and Z axes frames are reported in
    pub axis_mapping: [Direction; 3],
    /// Largest block body accepted from a server
    pub max_block_length: u32,
    /// Port used for endpoints given without one
    pub default_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            stream_mode: StreamMode::ServerPush,
            connect_timeout_ms: 5_000,
            request_types: ObjectKind::default_request_set(),
            axis_mapping: [Direction::Forward, Direction::Left, Direction::Up],
            max_block_length: 64 * 1024 * 1024,
            default_port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| StreamError::Config {
            reason: "malformed client configuration".to_string(),
            source: Some(Box::new(e)),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| StreamError::ConfigFile { path: path.to_path_buf(), source })?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!(path = %path.display(), "Loaded client configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(StreamError::config("buffer_size must be at least 1"));
        }
        if self.max_block_length == 0 {
            return Err(StreamError::config("max_block_length must be at least 1"));
        }
        if let Some(kind) = self.request_types.iter().find(|kind| !kind.is_requestable()) {
            return Err(StreamError::unsupported_kind(
                *kind,
                "control messages cannot be requested",
            ));
        }
        self.mapping()?;
        Ok(())
    }

    /// The configured axis mapping.
    pub fn mapping(&self) -> Result<AxisMapping> {
        let [x, y, z] = self.axis_mapping;
        Ok(AxisMapping::new(x, y, z)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Split `endpoint` into host and port, using the default port when none
    /// is given.
    pub fn resolve_endpoint(&self, endpoint: &str) -> Result<(String, u16)> {
        let endpoint = endpoint.trim();
        match endpoint.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port.parse().map_err(|e| StreamError::Config {
                    reason: format!("invalid port in endpoint {endpoint}"),
                    source: Some(Box::new(e)),
                })?;
                Ok((host.to_string(), port))
            }
            _ if !endpoint.is_empty() => Ok((endpoint.to_string(), self.default_port)),
            _ => Err(StreamError::config("empty endpoint")),
        }
    }
}
