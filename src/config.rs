//! Throttle configuration loaded from YAML or JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::error::{Result, ThrottleError};
use crate::ratelimit::{LimiterScope, Rate, TimeUnit};
use crate::throttle::{ThrottledReader, ThrottledWriter};

/// Rates for each direction of a stream.
///
/// ```yaml
/// read:
///   bytes_per_unit: 1048576
///   unit: second
/// write:
///   bytes_per_unit: 600
///   unit: minute
///   scope: shared
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Limit for bytes read; unthrottled if absent
    #[serde(default)]
    pub read: Option<DirectionConfig>,

    /// Limit for bytes written; unthrottled if absent
    #[serde(default)]
    pub write: Option<DirectionConfig>,
}

/// The limit for one direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionConfig {
    /// Number of bytes allowed per unit of time
    pub bytes_per_unit: u32,
    /// The time unit
    pub unit: TimeUnit,
    /// Whether the limit resets on every call or holds across calls
    #[serde(default)]
    pub scope: LimiterScope,
}

impl DirectionConfig {
    /// The validated rate for this direction.
    pub fn rate(&self) -> Result<Rate> {
        Rate::per(self.unit, self.bytes_per_unit)
    }
}

impl ThrottleConfig {
    /// Load configuration from a file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ThrottleConfig = serde_yaml::from_str(yaml).map_err(|e| {
            ThrottleError::Config(format!("Failed to parse throttle config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ThrottleConfig = serde_json::from_str(json).map_err(|e| {
            ThrottleError::Config(format!("Failed to parse throttle config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured rate can be paced.
    pub fn validate(&self) -> Result<()> {
        self.read_rate()?;
        self.write_rate()?;
        Ok(())
    }

    pub fn read_rate(&self) -> Result<Option<Rate>> {
        self.read.as_ref().map(DirectionConfig::rate).transpose()
    }

    pub fn write_rate(&self) -> Result<Option<Rate>> {
        self.write.as_ref().map(DirectionConfig::rate).transpose()
    }

    /// Wrap `inner` with the configured read limit.
    pub fn reader<R: AsyncRead>(&self, inner: R) -> Result<ThrottledReader<R>> {
        let direction = self
            .read
            .as_ref()
            .ok_or_else(|| ThrottleError::Config("no read rate configured".to_string()))?;
        Ok(ThrottledReader::with_scope(
            inner,
            direction.rate()?,
            direction.scope,
        ))
    }

    /// Wrap `inner` with the configured write limit.
    pub fn writer<W: AsyncWrite>(&self, inner: W) -> Result<ThrottledWriter<W>> {
        let direction = self
            .write
            .as_ref()
            .ok_or_else(|| ThrottleError::Config("no write rate configured".to_string()))?;
        Ok(ThrottledWriter::with_scope(
            inner,
            direction.rate()?,
            direction.scope,
        ))
    }
}
