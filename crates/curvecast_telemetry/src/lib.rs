// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback-synchronized UDP telemetry for CurveCast.
//!
//! This crate streams timeline samples over UDP at a precise configurable
//! rate and accepts inbound position updates ("sync mode"):
//! - Config snapshot with validation
//! - Frame assembly with JSON and binary encodings
//! - Drift-corrected rate governor
//! - Non-blocking outbound transport with latest-payload semantics
//! - Inbound sync receiver with latest-only handoff
//! - Service lifecycle with idempotent shutdown
//!
//! ## Architecture
//!
//! The owning control loop publishes playhead snapshots and drains inbound
//! sync positions; a dedicated governor thread samples the timeline on its
//! deadlines and hands frames to the transport thread. No context ever
//! blocks another beyond brief snapshot reads.

pub mod config;
pub mod frame;
pub mod governor;
pub mod receiver;
pub mod service;
pub mod slot;
pub mod transport;

pub use config::{ConfigError, PayloadFormat, TelemetryConfig, MAX_RATE_HZ, MIN_RATE_HZ};
pub use frame::{assemble, TelemetryFrame, PROTOCOL_VERSION};
pub use governor::RateGovernor;
pub use receiver::{decode_position, DecodeError, SyncReceiver};
pub use service::{ServiceError, SharedPlayhead, SharedTimeline, TelemetryService};
pub use slot::LatestSlot;
pub use transport::{TransportError, UdpSender};
