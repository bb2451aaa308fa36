use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use super::entry::ZoneEntry;
use crate::cloudflare::error::CloudflareError;

#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("Invalid zone entry: {0}")]
    InvalidEntry(String),

    #[error(transparent)]
    Cloudflare(#[from] CloudflareError),

    #[error("Zone change rejected: {0}")]
    Rejected(String),
}

/// Applies zone entries to a managed DNS zone.
///
/// Implementations must be safe to call concurrently, and both operations must be idempotent:
/// re-applying the current entry or removing an absent host succeeds without changes.
pub trait ZoneAdapter: Send + Sync {
    fn apply_entry<'a>(&'a self, entry: &'a ZoneEntry) -> BoxFuture<'a, Result<(), ZoneError>>;

    fn remove_entries<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<(), ZoneError>>;
}

impl<T> ZoneAdapter for Arc<T>
where
    T: ZoneAdapter + ?Sized,
{
    fn apply_entry<'a>(&'a self, entry: &'a ZoneEntry) -> BoxFuture<'a, Result<(), ZoneError>> {
        (**self).apply_entry(entry)
    }

    fn remove_entries<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<(), ZoneError>> {
        (**self).remove_entries(host)
    }
}
