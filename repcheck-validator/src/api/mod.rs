//! HTTP API handlers for repcheck-validator

pub mod cache;
pub mod export;
pub mod health;
pub mod history;
pub mod validate;

pub use cache::cache_routes;
pub use export::export_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use validate::validate_routes;
