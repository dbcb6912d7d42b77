//! # Paddock Common Library
//!
//! Shared code for the paddock telemetry importer:
//! - Error type used across crates
//! - Configuration loading (root folder, TOML config file)
//! - Import event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
