//! Shared domain types for Autoflow.
//!
//! This crate contains the data shapes exchanged between the pipeline engine,
//! the resilience layer, and the collaborators that persist and render runs:
//! configuration, step results, execution reports, circuit snapshots and
//! pipeline events.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod resilience;
