pub mod auth;
pub mod cache;
pub mod checklist;
pub mod dashboard;
pub mod error;
pub mod eta;
pub mod lifecycle;
pub mod loyalty;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod protocol;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod search;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use lifecycle::{OrderEdit, OrderLifecycle};
pub use routes::{config, AppState};
