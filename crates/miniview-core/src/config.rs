#![forbid(unsafe_code)]

//! Negotiation configuration.
//!
//! Defaults match the host protocol: fullscreen arrived in host version
//! 8.0, the launch safety timeout is one second, and the mobile breakpoint
//! is 768 logical pixels.
//!
//! # Env Var Contract
//!
//! - `MINIVIEW_FULLSCREEN_TIMEOUT_MS` - safety timeout in milliseconds
//! - `MINIVIEW_MIN_FULLSCREEN_VERSION` - dotted minimum host version
//! - `MINIVIEW_MOBILE_BREAKPOINT_PX` - mobile width breakpoint
//!
//! [`NegotiatorConfig::from_env`] ignores invalid values and keeps the
//! default; [`NegotiatorConfig::try_from_env`] reports them.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::device::DEFAULT_MOBILE_BREAKPOINT_PX;
use crate::version::HostVersion;

/// Default launch safety timeout.
pub const DEFAULT_FULLSCREEN_TIMEOUT: Duration = Duration::from_millis(1000);

/// First host protocol version exposing `requestFullscreen`.
pub const DEFAULT_MIN_FULLSCREEN_VERSION: [u32; 2] = [8, 0];

const ENV_TIMEOUT_MS: &str = "MINIVIEW_FULLSCREEN_TIMEOUT_MS";
const ENV_MIN_VERSION: &str = "MINIVIEW_MIN_FULLSCREEN_VERSION";
const ENV_BREAKPOINT: &str = "MINIVIEW_MOBILE_BREAKPOINT_PX";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

/// Tunables for one negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorConfig {
    /// How long a launch fullscreen request may stay unanswered.
    pub fullscreen_timeout: Duration,
    /// Minimum host version for fullscreen support.
    pub min_fullscreen_version: HostVersion,
    /// Viewport widths at or below this classify as mobile.
    pub mobile_breakpoint_px: u32,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            fullscreen_timeout: DEFAULT_FULLSCREEN_TIMEOUT,
            min_fullscreen_version: HostVersion::new(DEFAULT_MIN_FULLSCREEN_VERSION.to_vec()),
            mobile_breakpoint_px: DEFAULT_MOBILE_BREAKPOINT_PX,
        }
    }
}

impl NegotiatorConfig {
    #[must_use]
    pub fn with_fullscreen_timeout(mut self, timeout: Duration) -> Self {
        self.fullscreen_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_min_fullscreen_version(mut self, version: HostVersion) -> Self {
        self.min_fullscreen_version = version;
        self
    }

    #[must_use]
    pub fn with_mobile_breakpoint(mut self, px: u32) -> Self {
        self.mobile_breakpoint_px = px;
        self
    }

    /// Read overrides from the process environment, keeping defaults for
    /// anything missing or malformed.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup_lenient(|key| env::var(key).ok())
    }

    /// Read overrides from the process environment, failing on malformed
    /// values.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms = parse_value::<u64>(ENV_TIMEOUT_MS, &raw)?;
            config.fullscreen_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_MIN_VERSION) {
            config.min_fullscreen_version = parse_value(ENV_MIN_VERSION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BREAKPOINT) {
            config.mobile_breakpoint_px = parse_value(ENV_BREAKPOINT, &raw)?;
        }
        Ok(config)
    }

    fn from_lookup_lenient(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            fullscreen_timeout: lookup(ENV_TIMEOUT_MS)
                .and_then(|raw| parse_value::<u64>(ENV_TIMEOUT_MS, &raw).ok())
                .map_or(defaults.fullscreen_timeout, Duration::from_millis),
            min_fullscreen_version: lookup(ENV_MIN_VERSION)
                .and_then(|raw| parse_value(ENV_MIN_VERSION, &raw).ok())
                .unwrap_or(defaults.min_fullscreen_version),
            mobile_breakpoint_px: lookup(ENV_BREAKPOINT)
                .and_then(|raw| parse_value(ENV_BREAKPOINT, &raw).ok())
                .unwrap_or(defaults.mobile_breakpoint_px),
        }
    }

    /// Apply options passed from the embedding page.
    pub fn apply_options(mut self, options: &NegotiatorOptions) -> Result<Self, ConfigError> {
        if let Some(ms) = options.fullscreen_timeout_ms {
            self.fullscreen_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = options.min_fullscreen_version.as_deref() {
            self.min_fullscreen_version = parse_value("minFullscreenVersion", raw)?;
        }
        if let Some(px) = options.mobile_breakpoint_px {
            self.mobile_breakpoint_px = px;
        }
        Ok(self)
    }
}

/// Partial configuration as supplied by JS callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct NegotiatorOptions {
    pub fullscreen_timeout_ms: Option<u64>,
    pub min_fullscreen_version: Option<String>,
    pub mobile_breakpoint_px: Option<u32>,
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError {
        key,
        value: raw.to_owned(),
    })
}
