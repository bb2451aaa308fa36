use std::num::NonZeroU32;
use std::sync::Arc;

use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{debug, info};

use super::error::CloudflareError;
use super::types::{DnsRecord, DnsRecordPayload};
use super::CloudflareClient;
use crate::zone::{DesiredRecord, DnsRecordType, ZoneAdapter, ZoneEntry, ZoneError};

/// One request budget shared by every caller of the adapter.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn build_rate_limiter(requests_per_second: NonZeroU32) -> GlobalRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second)))
}

/// Applies DNSLink entries to one Cloudflare zone.
pub struct CloudflareZoneAdapter {
    client: CloudflareClient,
    zone_id: String,
    gateway: String,
    ttl: u32,
    rate_limiter: GlobalRateLimiter,
}

impl CloudflareZoneAdapter {
    pub fn new(
        client: CloudflareClient,
        zone_id: String,
        gateway: String,
        ttl: u32,
        rate_limiter: GlobalRateLimiter,
    ) -> Self {
        Self {
            client,
            zone_id,
            gateway,
            ttl,
            rate_limiter,
        }
    }

    /// Resolves `zone_name` once and builds the adapter for it.
    pub async fn connect(
        client: CloudflareClient,
        zone_name: &str,
        gateway: String,
        ttl: u32,
        rate_limiter: GlobalRateLimiter,
    ) -> Result<Self, CloudflareError> {
        rate_limiter.until_ready().await;
        let zone_id = client.find_zone_id(zone_name).await?;
        info!(zone_name, zone_id = %zone_id, "resolved cloudflare zone");
        Ok(Self::new(client, zone_id, gateway, ttl, rate_limiter))
    }

    async fn list(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Vec<DnsRecord>, CloudflareError> {
        self.rate_limiter.until_ready().await;
        self.client
            .list_records(&self.zone_id, record_type.as_str(), name)
            .await
    }

    async fn delete(&self, record: &DnsRecord) -> Result<(), CloudflareError> {
        self.rate_limiter.until_ready().await;
        self.client.delete_record(&self.zone_id, &record.id).await
    }

    fn payload(&self, desired: &DesiredRecord) -> DnsRecordPayload {
        DnsRecordPayload {
            type_: desired.record_type.as_str().to_string(),
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: self.ttl,
            proxied: match desired.record_type {
                DnsRecordType::Cname => Some(false),
                DnsRecordType::Txt => None,
            },
        }
    }

    /// Makes `desired` the only record of its type and name.
    async fn upsert(&self, desired: &DesiredRecord) -> Result<(), CloudflareError> {
        let mut existing = self.list(desired.record_type, &desired.name).await?;

        if let Some(pos) = existing
            .iter()
            .position(|record| content_matches(desired, record))
        {
            existing.swap_remove(pos);
            debug!(name = %desired.name, "dns record already current");
        } else if existing.is_empty() {
            self.rate_limiter.until_ready().await;
            self.client
                .create_record(&self.zone_id, &self.payload(desired))
                .await?;
        } else {
            let stale = existing.remove(0);
            self.rate_limiter.until_ready().await;
            self.client
                .update_record(&self.zone_id, &stale.id, &self.payload(desired))
                .await?;
        }

        for duplicate in &existing {
            self.delete(duplicate).await?;
        }
        Ok(())
    }
}

fn content_matches(desired: &DesiredRecord, record: &DnsRecord) -> bool {
    match desired.record_type {
        DnsRecordType::Cname => record
            .content
            .trim_end_matches('.')
            .eq_ignore_ascii_case(&desired.content),
        DnsRecordType::Txt => record.content.trim_matches('"') == desired.content,
    }
}

impl ZoneAdapter for CloudflareZoneAdapter {
    fn apply_entry<'a>(&'a self, entry: &'a ZoneEntry) -> BoxFuture<'a, Result<(), ZoneError>> {
        Box::pin(async move {
            for desired in entry.dns_records(&self.gateway) {
                self.upsert(&desired).await?;
            }
            Ok(())
        })
    }

    fn remove_entries<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<(), ZoneError>> {
        Box::pin(async move {
            let targets = [
                (DnsRecordType::Cname, host.to_string()),
                (DnsRecordType::Txt, crate::zone::dnslink_name(host)),
            ];
            for (record_type, name) in targets {
                for record in self.list(record_type, &name).await? {
                    self.delete(&record).await?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(type_: &str, content: &str) -> DnsRecord {
        DnsRecord {
            id: "r1".to_string(),
            type_: type_.to_string(),
            name: "a.bit.cc".to_string(),
            content: content.to_string(),
            ttl: 1,
            proxied: None,
        }
    }

    #[test]
    fn cname_match_ignores_case_and_trailing_dot() {
        let desired = DesiredRecord {
            record_type: DnsRecordType::Cname,
            name: "a.bit.cc".to_string(),
            content: "gateway.example".to_string(),
        };

        assert!(content_matches(&desired, &record("CNAME", "Gateway.Example.")));
        assert!(!content_matches(&desired, &record("CNAME", "other.example")));
    }

    #[test]
    fn txt_match_tolerates_quoted_content() {
        let desired = DesiredRecord {
            record_type: DnsRecordType::Txt,
            name: "_dnslink.a.bit.cc".to_string(),
            content: "dnslink=/ipfs/CIDone".to_string(),
        };

        assert!(content_matches(&desired, &record("TXT", "\"dnslink=/ipfs/CIDone\"")));
        assert!(!content_matches(&desired, &record("TXT", "dnslink=/ipfs/CIDtwo")));
    }
}
