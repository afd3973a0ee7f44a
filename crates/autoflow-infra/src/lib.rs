//! Infrastructure for Autoflow: configuration loading, workflow files and
//! the built-in step modules that reach the network.

pub mod config;
pub mod workflow;
