//! Utility modules for paddock-ingest

pub mod db_retry;

pub use db_retry::{retry_on_lock, retry_with_backoff};
