//! Cadence CLI
//!
//! Loads a playlist and configuration, then drives the transport controller
//! against the simulated engine while logging transport activity.

pub mod config;
pub mod error;
pub mod player;
pub mod playlist;

pub use error::{CliError, Result};
