pub mod build_info;
pub mod cli;
pub mod cloudflare;
pub mod commands;
pub mod config;
pub mod db;
pub mod logging;
pub mod record_store;
pub mod server;
pub mod state;
pub mod sync_service;
pub mod zone;
