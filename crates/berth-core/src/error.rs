use std::fmt;

use berth_model::{FailureKind, ModelError, ProgressEvent};
use berth_session::SessionError;
use thiserror::Error;

/// Failure reported by the cluster substrate.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    Conflict { kind: &'static str, name: String },

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("cluster api error: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("dns lookup of '{name}' failed: {reason}")]
    Lookup { name: String, reason: String },

    #[error("{0} lookups are not supported by this resolver")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("container '{0}' has no port to route to")]
    NoPort(String),

    #[error("route for '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Direction of a convergence that did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Stop => "stop",
        })
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid container spec: {0}")]
    Invalid(#[from] ModelError),

    #[error("container '{0}' not found")]
    NotFound(String),

    #[error("container '{0}' already exists")]
    Conflict(String),

    /// The watch stream ended before the expected state was observed.
    #[error("container '{name}' failed to {phase}")]
    NotConverged { name: String, phase: Phase },

    /// The governing cancellation token fired. The payload names the interrupted stage.
    #[error("{0} aborted")]
    Aborted(&'static str),

    #[error("domain '{domain}' was not verified within {waited_ms} ms")]
    VerificationTimeout { domain: String, waited_ms: u64 },

    #[error(transparent)]
    Cluster(ClusterError),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Session(SessionError),
}

impl From<ClusterError> for CoreError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound { name, .. } => CoreError::NotFound(name),
            ClusterError::Conflict { name, .. } => CoreError::Conflict(name),
            other => CoreError::Cluster(other),
        }
    }
}

impl From<SessionError> for CoreError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Aborted => CoreError::Aborted("session"),
            other => CoreError::Session(other),
        }
    }
}

impl CoreError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, CoreError::Aborted(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CoreError::Invalid(_) => FailureKind::Invalid,
            CoreError::NotFound(_) => FailureKind::NotFound,
            CoreError::Conflict(_) => FailureKind::Conflict,
            CoreError::NotConverged { .. } => FailureKind::NotConverged,
            CoreError::VerificationTimeout { .. } => FailureKind::VerificationTimeout,
            CoreError::Cluster(_) => FailureKind::Cluster,
            CoreError::Dns(_) => FailureKind::Dns,
            CoreError::Route(_) => FailureKind::Route,
            CoreError::Session(_) | CoreError::Aborted(_) => FailureKind::Session,
        }
    }

    /// Terminal `Failed` event for this error.
    pub fn to_event(&self) -> ProgressEvent {
        ProgressEvent::Failed {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
