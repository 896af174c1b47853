pub mod analysis;
pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
