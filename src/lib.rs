// Public API for integration tests and potential library usage

pub mod api;
pub mod app;
pub mod config;
pub mod courier;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod types;
pub mod ws;

mod driver;
