pub mod adapter;
pub mod error;
pub mod types;

pub use adapter::CloudflareZoneAdapter;

use error::CloudflareError;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use types::{ApiResponse, DeletedRecord, DnsRecord, DnsRecordPayload, Zone};

use crate::config::CloudflareAuth;

/// Thin client over the Cloudflare v4 DNS endpoints this service needs.
#[derive(Clone)]
pub struct CloudflareClient {
    client: reqwest::Client,
    base_url: String,
    auth: CloudflareAuth,
}

impl CloudflareClient {
    pub fn new(base_url: &str, auth: CloudflareAuth) -> Result<Self, CloudflareError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::KeyEmail { key, email } => request
                .header("X-Auth-Key", key)
                .header("X-Auth-Email", email),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        operation: &str,
    ) -> Result<T, CloudflareError> {
        let status = response.status();
        if !status.is_success() {
            // Cloudflare still sends the envelope on most 4xx, which carries the useful reason.
            if let Ok(body) = response.json::<ApiResponse<serde_json::Value>>().await {
                if !body.errors.is_empty() {
                    return Err(CloudflareError::ApiFailure {
                        operation: operation.to_string(),
                        errors: body.errors,
                    });
                }
            }
            return Err(CloudflareError::UnexpectedStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.json::<ApiResponse<T>>().await?;
        match (body.success, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(CloudflareError::ApiFailure {
                operation: operation.to_string(),
                errors: body.errors,
            }),
        }
    }

    /// Resolves a zone name such as `bit.cc` to its zone id.
    pub async fn find_zone_id(&self, zone_name: &str) -> Result<String, CloudflareError> {
        let url = format!("{}/zones", self.base_url);
        let response = self
            .authorize(self.client.get(&url).query(&[("name", zone_name)]))
            .send()
            .await?;

        let zones: Vec<Zone> = Self::decode(response, "looking up zone").await?;
        zones
            .into_iter()
            .find(|zone| zone.name.eq_ignore_ascii_case(zone_name))
            .map(|zone| zone.id)
            .ok_or_else(|| CloudflareError::ZoneNotFound(zone_name.to_string()))
    }

    pub async fn list_records(
        &self,
        zone_id: &str,
        record_type: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, CloudflareError> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let response = self
            .authorize(
                self.client
                    .get(&url)
                    .query(&[("type", record_type), ("name", name)]),
            )
            .send()
            .await?;
        Self::decode(response, "listing dns records").await
    }

    pub async fn create_record(
        &self,
        zone_id: &str,
        payload: &DnsRecordPayload,
    ) -> Result<DnsRecord, CloudflareError> {
        debug!(name = %payload.name, record_type = %payload.type_, "creating dns record");
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let response = self
            .authorize(self.client.post(&url).json(payload))
            .send()
            .await?;
        Self::decode(response, "creating dns record").await
    }

    pub async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        payload: &DnsRecordPayload,
    ) -> Result<DnsRecord, CloudflareError> {
        debug!(name = %payload.name, record_id, "updating dns record");
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.base_url, zone_id, record_id
        );
        let response = self
            .authorize(self.client.put(&url).json(payload))
            .send()
            .await?;
        Self::decode(response, "updating dns record").await
    }

    pub async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), CloudflareError> {
        debug!(record_id, "deleting dns record");
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.base_url, zone_id, record_id
        );
        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::decode::<DeletedRecord>(response, "deleting dns record").await?;
        Ok(())
    }
}
