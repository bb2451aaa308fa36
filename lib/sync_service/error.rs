use thiserror::Error;
use tokio::task::JoinError;

use crate::cloudflare::error::CloudflareError;
use crate::config::ConfigError;
use crate::record_store::StoreError;
use crate::zone::ZoneError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error")]
    Config(#[from] ConfigError),

    #[error("Record store error")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error("Cloudflare error")]
    Cloudflare(#[from] CloudflareError),

    #[error("Database pool could not be built: {0}")]
    DBPoolBuild(String),

    #[error("Task join error: {0}")]
    TaskJoinError(#[from] JoinError),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}
