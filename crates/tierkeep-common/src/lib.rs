//! Tierkeep Common - Shared types and utilities
//!
//! This crate provides the node and location types, error definitions and
//! configuration used by the lifecycle and index crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
