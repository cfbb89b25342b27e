use std::{fmt, time::Duration};

use berth_model::Tenant;
use sha2::{Digest, Sha256};

use crate::domain::DEFAULT_POLL_INTERVAL_MS;

/// Prefix of the TXT challenge label; the tenant id is appended to it.
pub const CHALLENGE_PREFIX: &str = "_berth-challenge";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Txt,
    Cname,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::Txt => "TXT",
            RecordType::Cname => "CNAME",
        })
    }
}

/// DNS record a tenant publishes to prove it owns a domain.
///
/// Derived only from the domain and the tenant, so every call yields the same challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainChallenge {
    pub domain: String,
    pub record_type: RecordType,
    pub record_name: String,
    pub record_value: String,
    pub poll_interval: Duration,
}

impl DomainChallenge {
    /// `_berth-challenge-<tenant id>.<domain>` TXT `sha256_hex("<created_at_ms>:<root domain>")`.
    pub fn txt(domain: &str, tenant: &Tenant) -> Self {
        let domain = normalize(domain);
        let digest = Sha256::digest(format!("{}:{}", tenant.created_at_ms, root_domain(&domain)));
        Self {
            record_name: format!("{CHALLENGE_PREFIX}-{}.{domain}", tenant_label(&tenant.id)),
            record_value: hex::encode(digest),
            record_type: RecordType::Txt,
            domain,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// `<domain>` CNAME `<tenant id>.<ingress suffix>`.
    pub fn cname(domain: &str, tenant: &Tenant, ingress_suffix: &str) -> Self {
        let domain = normalize(domain);
        Self {
            record_name: domain.clone(),
            record_value: format!("{}.{}", tenant.id.to_ascii_lowercase(), normalize(ingress_suffix)),
            record_type: RecordType::Cname,
            domain,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns `true` if any resolved value is the challenge value.
    ///
    /// Case, surrounding quotes and trailing dots are ignored.
    pub fn matches<S: AsRef<str>>(&self, values: &[S]) -> bool {
        values
            .iter()
            .any(|v| normalize(v.as_ref().trim().trim_matches('"')) == self.record_value)
    }
}

impl fmt::Display for DomainChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record {} with value {}",
            self.record_type, self.record_name, self.record_value
        )
    }
}

/// Last two labels of `domain`, lowercased.
pub fn root_domain(domain: &str) -> String {
    let domain = normalize(domain);
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain;
    }
    labels[labels.len() - 2..].join(".")
}

/// Tenant id as a DNS label: lowercase, anything but `[a-z0-9-]` becomes `-`.
fn tenant_label(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-') => c,
            _ => '-',
        })
        .collect()
}

fn normalize(s: &str) -> String {
    s.trim().trim_end_matches('.').to_ascii_lowercase()
}
