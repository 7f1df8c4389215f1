//! Database schema, repositories and reverse-index maintenance

pub mod audit;
pub mod catalog;
pub mod index;
pub mod init;
pub mod media;
pub mod migrations;
pub mod models;
pub mod settings;
pub mod users;

pub use init::*;
pub use migrations::*;
pub use models::*;
