// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod protocol;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod types;
