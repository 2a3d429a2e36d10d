// Public API for integration tests and the binary

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
