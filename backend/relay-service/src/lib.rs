pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod server;
pub mod state;
