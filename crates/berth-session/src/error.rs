use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session aborted")]
    Aborted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("terminal error: {0}")]
    Terminal(String),

    #[error("remote process error: {0}")]
    Remote(String),
}
