// SPDX-License-Identifier: MIT OR Apache-2.0
//! Telemetry configuration snapshot.
//!
//! Persistence lives outside this crate; callers hand the core a resolved
//! [`TelemetryConfig`] and the core never reads settings storage itself.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Lowest accepted send rate in Hz
pub const MIN_RATE_HZ: u32 = 1;
/// Highest accepted send rate in Hz
pub const MAX_RATE_HZ: u32 = 240;

/// Configuration errors, rejected before the governor starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Send rate outside the accepted range
    #[error("telemetry rate {0} Hz is outside {MIN_RATE_HZ}..={MAX_RATE_HZ}")]
    RateOutOfRange(u32),

    /// Target address failed to parse
    #[error("invalid telemetry address: {0}")]
    InvalidAddress(String),

    /// Zero port
    #[error("telemetry port must be non-zero")]
    InvalidPort,
}

/// Outbound payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Compact JSON document
    #[default]
    Json,
    /// Headerless little-endian f32 concatenation
    Binary,
}

/// Resolved telemetry settings, immutable per governor cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether outbound telemetry is active
    #[serde(default)]
    pub enabled: bool,
    /// Outbound target IP
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Outbound target port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Send rate in Hz, 1..=240
    #[serde(default = "default_rate")]
    pub rate_hz: u32,
    /// Session token carried in every frame; generated when unset
    #[serde(default)]
    pub session_id: Option<String>,
    /// Outbound payload encoding
    #[serde(default)]
    pub payload_format: PayloadFormat,
    /// Whether playback wraps at the end of the timeline
    #[serde(default)]
    pub loop_enabled: bool,
    /// Whether the inbound sync listener runs
    #[serde(default)]
    pub sync_enabled: bool,
    /// Inbound sync listener port, distinct from the outbound target.
    /// Zero binds an ephemeral port.
    #[serde(default = "default_sync_port")]
    pub sync_port: u16,
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_rate() -> u32 {
    60
}

fn default_sync_port() -> u16 {
    9001
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip: default_ip(),
            port: default_port(),
            rate_hz: default_rate(),
            session_id: None,
            payload_format: PayloadFormat::default(),
            loop_enabled: false,
            sync_enabled: false,
            sync_port: default_sync_port(),
        }
    }
}

impl TelemetryConfig {
    /// Check every field the governor depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.rate_hz) {
            return Err(ConfigError::RateOutOfRange(self.rate_hz));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        self.ip
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress(self.ip.clone()))?;
        Ok(())
    }

    /// Outbound target as a socket address
    pub fn target(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.ip.clone()))?;
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The configured session id, or a freshly generated token
    pub fn resolved_session_id(&self) -> String {
        match &self.session_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    /// Send period derived from the rate
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ)))
    }
}
