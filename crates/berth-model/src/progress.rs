use std::fmt;

use serde::{Deserialize, Serialize};

/// Event emitted by the provisioning pipeline.
///
/// `Progress` is informational and can be ignored. `Done` and `Failed` are terminal: nothing
/// follows them on the same stream. Consumers must process events in emission order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Progress { message: String },
    Done { result: RunResult },
    Failed { kind: FailureKind, message: String },
}

impl ProgressEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        ProgressEvent::Progress {
            message: message.into(),
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Progress { message } => f.write_str(message),
            ProgressEvent::Done { result } => write!(f, "{result}"),
            ProgressEvent::Failed { message, .. } => write!(f, "error: {message}"),
        }
    }
}

/// Structured result carried by a terminal `Done` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunResult {
    /// Workload already existed and `force` was not set. Nothing was changed.
    AlreadyExists { name: String },
    /// Workload is ready; returned for detached runs.
    Running {
        name: String,
        replicas: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// An attach/exec session finished.
    SessionEnded { name: String, end: SessionEnd },
    /// The followed log stream ended.
    LogsEnded { name: String },
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::AlreadyExists { name } => {
                write!(f, "container '{name}' already exists, use --force to recreate it")
            }
            RunResult::Running {
                name,
                replicas,
                url: Some(url),
            } => write!(f, "container '{name}' is running with {replicas} replica(s) at {url}"),
            RunResult::Running { name, replicas, .. } => {
                write!(f, "container '{name}' is running with {replicas} replica(s)")
            }
            RunResult::SessionEnded { name, end } => write!(f, "session with '{name}' {end}"),
            RunResult::LogsEnded { name } => write!(f, "log stream of '{name}' ended"),
        }
    }
}

/// How an interactive session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEnd {
    /// The user typed the detach sequence. The remote process keeps running.
    Detached,
    /// Remote output ended (usually the process exited).
    OutputClosed,
    /// Local input ended.
    InputClosed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEnd::Detached => "detached",
            SessionEnd::OutputClosed => "closed",
            SessionEnd::InputClosed => "closed by local input",
        })
    }
}

/// Category of a terminal failure, stable across drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Invalid,
    NotFound,
    Conflict,
    NotConverged,
    VerificationTimeout,
    Cluster,
    Dns,
    Route,
    Session,
}
