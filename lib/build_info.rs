/// Build identity reported by the CLI, the bootstrap log event and `/metrics`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("DNSLINK_SYNC_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("DNSLINK_SYNC_GIT_COMMIT_HASH")
);

/// Returns the first 12 characters of the commit hash, or `"unknown"`.
pub fn short_commit_hash() -> &'static str {
    let short_len = 12usize.min(GIT_COMMIT_HASH.len());
    &GIT_COMMIT_HASH[..short_len]
}
