//! paddock-ingest library interface
//!
//! Gap-driven, quota-aware import of session telemetry into the local store.
//! Exposes the scheduler components for the binary and for integration testing.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ImportError, ImportResult};
