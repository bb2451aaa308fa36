use serde::{Deserialize, Serialize};

/// Response envelope shared by every Cloudflare v4 endpoint.
#[derive(Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiMessage {
    pub code: i64,
    pub message: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: Option<bool>,
}

/// Body for record create and overwrite calls.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordPayload {
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
}

/// `DELETE` answers with just the removed record id.
#[derive(Deserialize, Debug, Clone)]
pub struct DeletedRecord {
    pub id: String,
}
