//! Common types and utilities shared across all agent-hub crates

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::*;
pub use error::{HubError, Result};
pub use telemetry::init_tracing_with_level;
pub use types::*;
