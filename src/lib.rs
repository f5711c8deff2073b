//! Screeps benchmark runner library

pub mod api_client;
pub mod app;
pub mod benchmark;
pub mod command_channel;
pub mod config;
pub mod error;
pub mod local_logger;
pub mod logger;
mod prelude;
pub mod report;
mod request_client;
pub mod server;
pub mod socket;

#[cfg(test)]
mod test_http;

pub use local_logger::clean_logger;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
