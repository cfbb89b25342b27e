use serde::{Deserialize, Serialize};

use crate::Namespace;

/// Owner of a namespace.
///
/// `created_at_ms` is part of the domain-ownership challenge, so it must be the stable creation
/// time of the tenant record, not a per-request clock value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub namespace: Namespace,
    /// Unix epoch milliseconds.
    pub created_at_ms: i64,
}

impl Tenant {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            created_at_ms,
        }
    }
}
