#![forbid(unsafe_code)]

//! Core: device classification, host versions, capability probing, and the
//! host adapter contract for MiniView.
//!
//! Everything here is pure. Time, I/O and the state machine live in
//! `miniview-web`.

pub mod capability;
pub mod config;
pub mod device;
pub mod host;
pub mod launch_override;
pub mod version;

pub use capability::{CapabilitySet, probe};
pub use config::{ConfigError, NegotiatorConfig, NegotiatorOptions};
pub use device::{Classification, DeviceClass, Platform, PlatformSource, Signals, classify};
pub use host::{HostAdapter, HostError, HostEvent, HostEventKind, SubscriptionId};
pub use version::{HostVersion, VersionParseError};
