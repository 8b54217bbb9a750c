//! # Curio Common Library
//!
//! Shared code for the Curio personalization store:
//! - Error taxonomy (`Error`, `Result`)
//! - Storage location and TOML configuration
//! - Schema & storage layer (open, migrate, transactions)
//! - Persisted models
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use db::Database;
pub use error::{Error, Result};
