use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use nonzero_ext::nonzero;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("Cloudflare credentials missing: set CLOUDFLARE_API_TOKEN or both CLOUDFLARE_API_KEY and CLOUDFLARE_API_EMAIL")]
    MissingCredentials,
}

/// How requests to the Cloudflare API authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum CloudflareAuth {
    Token(String),
    /// Legacy global API key + account email pair.
    KeyEmail { key: String, email: String },
}

impl std::fmt::Debug for CloudflareAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudflareAuth::Token(_) => f.write_str("Token(<redacted>)"),
            CloudflareAuth::KeyEmail { email, .. } => f
                .debug_struct("KeyEmail")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub cloudflare_api_url: String,
    pub cloudflare_auth: CloudflareAuth,
    /// Name of the managed zone, e.g. `bit.cc`.
    pub cloudflare_zone_name: String,
    pub cloudflare_rps: NonZeroU32,
    /// Gateway host every account CNAME points at.
    pub ipfs_gateway: String,
    /// Appended to account names to build DNS hosts.
    pub hostname_suffix: String,
    /// Default: 1 (automatic on Cloudflare).
    pub dns_ttl: u32,
    /// Default: 1000ms
    pub poll_interval: Duration,
    /// Default: 4
    pub n_workers: usize,
    /// Overrides the snapshot-sized job queue when set.
    pub queue_capacity: Option<usize>,
    pub metrics_addr: SocketAddr,
}

pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let db_url = required("DATABASE_URL")?;
        let cloudflare_zone_name = required("CLOUDFLARE_ZONE_NAME")?;
        let ipfs_gateway = required("IPFS_GATEWAY")?;
        let raw_suffix = required("HOSTNAME_SUFFIX")?;
        let hostname_suffix = raw_suffix.trim().trim_matches('.').to_ascii_lowercase();
        if hostname_suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "HOSTNAME_SUFFIX".to_string(),
                value: raw_suffix,
            });
        }

        let cloudflare_auth = match (
            lookup("CLOUDFLARE_API_TOKEN"),
            lookup("CLOUDFLARE_API_KEY"),
            lookup("CLOUDFLARE_API_EMAIL"),
        ) {
            (Some(token), _, _) if !token.is_empty() => CloudflareAuth::Token(token),
            (_, Some(key), Some(email)) if !key.is_empty() && !email.is_empty() => {
                CloudflareAuth::KeyEmail { key, email }
            }
            _ => return Err(ConfigError::MissingCredentials),
        };

        let cloudflare_api_url = lookup("CLOUDFLARE_API_URL")
            .unwrap_or_else(|| DEFAULT_CLOUDFLARE_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let cloudflare_rps = match lookup("CLOUDFLARE_RPS") {
            Some(raw) => {
                let rps: u32 = parse_value("CLOUDFLARE_RPS", &raw)?;
                NonZeroU32::new(rps).ok_or_else(|| ConfigError::InvalidValue {
                    name: "CLOUDFLARE_RPS".to_string(),
                    value: raw,
                })?
            }
            None => nonzero!(4u32),
        };

        let dns_ttl = parse_or(&lookup, "DNS_TTL", 1u32)?;
        let poll_interval_ms = parse_or(&lookup, "POLL_INTERVAL_MS", 1000u64)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_MS".to_string(),
                value: "0".to_string(),
            });
        }

        let n_workers = parse_or(&lookup, "N_WORKERS", 4usize)?;
        if n_workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "N_WORKERS".to_string(),
                value: "0".to_string(),
            });
        }

        let queue_capacity = match lookup("QUEUE_CAPACITY") {
            Some(raw) => Some(parse_value("QUEUE_CAPACITY", &raw)?),
            None => None,
        };

        let metrics_addr = parse_or(
            &lookup,
            "METRICS_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        Ok(Self {
            db_url,
            cloudflare_api_url,
            cloudflare_auth,
            cloudflare_zone_name,
            cloudflare_rps,
            ipfs_gateway,
            hostname_suffix,
            dns_ttl,
            poll_interval: Duration::from_millis(poll_interval_ms),
            n_workers,
            queue_capacity,
            metrics_addr,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
