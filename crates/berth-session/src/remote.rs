use std::sync::Arc;

use async_trait::async_trait;
use berth_model::{RemoteSignal, TerminalSize};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SessionError;

/// Future resolving to the remote process exit code.
pub type ExitStatus = BoxFuture<'static, Result<i32, SessionError>>;

/// Out-of-band controls of a remote process.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Propagate a local terminal size change.
    async fn resize(&self, size: TerminalSize) -> Result<(), SessionError>;

    /// Inject a terminal control signal.
    async fn signal(&self, signal: RemoteSignal) -> Result<(), SessionError>;
}

/// Control for processes that accept neither resizes nor signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoControl;

#[async_trait]
impl RemoteControl for NoControl {
    async fn resize(&self, _size: TerminalSize) -> Result<(), SessionError> {
        Ok(())
    }

    async fn signal(&self, _signal: RemoteSignal) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Streams of a remote process, consumed by the tunnel.
pub struct RemoteIo {
    /// `None` when the process was started without stdin.
    pub stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub control: Arc<dyn RemoteControl>,
}

/// Handle to a process running inside a container (attach target or exec).
pub struct RemoteProcess {
    pub io: RemoteIo,
    pub status: ExitStatus,
}

impl RemoteProcess {
    pub fn new(io: RemoteIo, status: ExitStatus) -> Self {
        Self { io, status }
    }

    /// Separate the streams (for the tunnel) from the exit status (for the caller).
    pub fn split(self) -> (RemoteIo, ExitStatus) {
        (self.io, self.status)
    }
}
