// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! GeoPulse - event-time zone load stream processor
//!
//! GeoPulse consumes a high-rate stream of per-zone load samples from a
//! partitioned log and derives, per zone, a stable operational state in
//! {NORMAL, STRESSED, CRITICAL}. State changes are published as alerts and
//! materialized for near-real-time queries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       GeoPulse Engine                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌────────────┐   ┌──────────┐   ┌─────────┐   │
//! │  │ Ingress │ → │ Dispatcher │ → │ Windows  │ → │ Emitter │   │
//! │  │ (log)   │   │ (N shards) │   │ + States │   │         │   │
//! │  └─────────┘   └────────────┘   └──────────┘   └────┬────┘   │
//! │       ↑                                             │        │
//! │       └──────────── offset acks ────────────────────┤        │
//! │                                     ┌───────────────┴──────┐ │
//! │                                     │ alert topic + store  │ │
//! │                                     └──────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Correctness rests on event-time semantics: both sliding windows and the
//! confirmation timers are driven exclusively by the timestamps carried in
//! the samples, so replaying the same stream reproduces the same alerts.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod metrics;
pub mod model;
pub mod state;
pub mod store;
pub mod transport;
pub mod window;

// Re-exports for convenience
pub use crate::config::Config;
pub use crate::core::Engine;
pub use crate::metrics::Metrics;
pub use crate::model::{Alert, SampleEvent, ZoneStatus};
pub use crate::state::{StateMachine, ZoneState};
pub use crate::window::SlidingWindow;

/// GeoPulse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GeoPulse name
pub const NAME: &str = "GeoPulse";
