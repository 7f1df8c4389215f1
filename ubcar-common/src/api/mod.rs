//! Shared authentication helpers
//!
//! Pure functions plus the settings-table secret lookup. HTTP framework
//! wiring (extractors, middleware) lives in the service crate.

pub mod auth;

pub use auth::{
    create_nonce, generate_salt, hash_password, load_nonce_secret, verify_nonce,
    verify_password, NonceContext, MEDIA_NONCE_ACTION,
};
