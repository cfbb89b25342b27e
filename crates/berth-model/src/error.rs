use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid container name '{0}': must be a DNS label (a-z, 0-9, '-', at most 63 chars)")]
    InvalidName(String),

    #[error("invalid env entry '{0}': expected KEY=VALUE with an uppercase key")]
    InvalidEnv(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("invalid replicas: {0}")]
    InvalidReplicas(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
