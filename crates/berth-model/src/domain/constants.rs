//! Well-known label keys stamped on every workload berth creates.
//!
//! Watches are filtered server-side with these, so a change here changes which events the
//! condition watcher ever sees.

/// Label carrying the container name. Used as the watch selector.
pub const LABEL_NAME: &str = "app.berth.io/name";

/// Label marking resources owned by berth.
pub const LABEL_MANAGED_BY: &str = "app.berth.io/managed-by";

/// Value stored under [`LABEL_MANAGED_BY`].
pub const MANAGED_BY_VALUE: &str = "berth";
