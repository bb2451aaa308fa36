/// Record keys that carry content pointers.
pub const CONTENT_KEYS: [&str; 2] = ["ipfs", "ipns"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Ipfs,
    Ipns,
}

impl ContentKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "ipfs" => Some(Self::Ipfs),
            "ipns" => Some(Self::Ipns),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ipfs => "ipfs",
            Self::Ipns => "ipns",
        }
    }
}

/// DNS-side representation of one account's content pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEntry {
    pub account: String,
    pub host: String,
    pub kind: ContentKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsRecordType {
    Cname,
    Txt,
}

impl DnsRecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        }
    }
}

/// One concrete DNS record an entry materialises into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
}

impl ZoneEntry {
    /// TXT record name read by DNSLink resolvers.
    pub fn dnslink_name(&self) -> String {
        dnslink_name(&self.host)
    }

    pub fn dnslink_content(&self) -> String {
        format!("dnslink=/{}/{}", self.kind.as_str(), self.value)
    }

    /// The gateway CNAME plus the `_dnslink` TXT record.
    pub fn dns_records(&self, gateway: &str) -> Vec<DesiredRecord> {
        vec![
            DesiredRecord {
                record_type: DnsRecordType::Cname,
                name: self.host.clone(),
                content: gateway.trim_end_matches('.').to_string(),
            },
            DesiredRecord {
                record_type: DnsRecordType::Txt,
                name: self.dnslink_name(),
                content: self.dnslink_content(),
            },
        ]
    }
}

pub fn dnslink_name(host: &str) -> String {
    format!("_dnslink.{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipns_entry_materialises_cname_and_dnslink() {
        let entry = ZoneEntry {
            account: "b.bit".to_string(),
            host: "b.bit.cc".to_string(),
            kind: ContentKind::Ipns,
            value: "nameKeyX".to_string(),
        };

        let records = entry.dns_records("gateway.example.");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type, DnsRecordType::Cname);
        assert_eq!(records[0].name, "b.bit.cc");
        assert_eq!(records[0].content, "gateway.example");
        assert_eq!(records[1].record_type, DnsRecordType::Txt);
        assert_eq!(records[1].name, "_dnslink.b.bit.cc");
        assert_eq!(records[1].content, "dnslink=/ipns/nameKeyX");
    }

    #[test]
    fn content_kind_parses_case_insensitively() {
        assert_eq!(ContentKind::from_key("IPFS"), Some(ContentKind::Ipfs));
        assert_eq!(ContentKind::from_key("ipns"), Some(ContentKind::Ipns));
        assert_eq!(ContentKind::from_key("dweb"), None);
    }
}
