use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{domain::DnsResolver, error::DnsError};

/// DNS zone held in memory. Names are matched case-insensitively, ignoring a trailing dot.
#[derive(Debug, Default)]
pub struct MemoryDns {
    txt: Mutex<HashMap<String, Vec<String>>>,
    cname: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_txt(&self, name: &str, values: Vec<String>) {
        if let Ok(mut zone) = self.txt.lock() {
            zone.insert(key(name), values);
        }
    }

    pub fn set_cname(&self, name: &str, target: &str) {
        if let Ok(mut zone) = self.cname.lock() {
            zone.insert(key(name), vec![target.to_string()]);
        }
    }
}

fn key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn lookup(zone: &Mutex<HashMap<String, Vec<String>>>, name: &str) -> Result<Vec<String>, DnsError> {
    let zone = zone.lock().map_err(|_| DnsError::Lookup {
        name: name.to_string(),
        reason: "zone lock poisoned".into(),
    })?;
    Ok(zone.get(&key(name)).cloned().unwrap_or_default())
}

#[async_trait]
impl DnsResolver for MemoryDns {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        lookup(&self.txt, name)
    }

    async fn resolve_cname(&self, name: &str) -> Result<Vec<String>, DnsError> {
        lookup(&self.cname, name)
    }
}
