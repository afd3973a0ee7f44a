//! Logging and trace export setup for the Autoflow binary.

pub mod tracing_setup;
