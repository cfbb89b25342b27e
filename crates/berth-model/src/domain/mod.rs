mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod labels;
pub use labels::Labels;

mod constants;
pub use constants::{LABEL_MANAGED_BY, LABEL_NAME, MANAGED_BY_VALUE};

/// Tenant namespace that scopes every workload lookup.
///
/// Workload names are unique only within a namespace.
pub type Namespace = String;
