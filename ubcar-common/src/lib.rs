//! # UBCAR Common Library
//!
//! Shared code for the UBCAR services including:
//! - Database schema, migrations and catalog repositories
//! - Reverse-index maintenance for media placement (layers and points)
//! - Request-forgery tokens and password hashing
//! - Configuration loading and root folder resolution

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
