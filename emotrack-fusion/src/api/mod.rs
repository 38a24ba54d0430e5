//! HTTP API handlers for emotrack-fusion

pub mod auth;
pub mod buildinfo;
pub mod health;
pub mod sessions;

pub use auth::auth_middleware;
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use sessions::{
    get_result, ingest_frame, list_sessions, process_frame, start_session, stop_session,
};
