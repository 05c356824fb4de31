pub mod app;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod mcp;
pub mod services;
pub mod utils;
