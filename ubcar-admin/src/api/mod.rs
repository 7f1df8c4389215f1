//! HTTP API handlers for ubcar-admin

pub mod auth;
pub mod buildinfo;
pub mod create;
pub mod health;
pub mod media;
pub mod redirect;
pub mod ui;

pub use auth::{issue_nonce, login, logout, session_middleware, Session};
pub use buildinfo::get_build_info;
pub use create::create_medium;
pub use health::health_routes;
pub use media::{
    media_backward, media_delete, media_edit, media_edit_submit, media_forward, media_initial,
};
pub use redirect::redirect_page;
pub use ui::{serve_app_js, serve_index};
