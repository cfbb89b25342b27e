use std::{fmt, sync::Arc};

use berth_model::{LocalSignal, TerminalSize};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::oneshot,
};

use crate::terminal::{NullTerminal, Terminal};

/// Receiver of a session's final exit code.
///
/// Delivered out of band: the code never travels on the progress stream.
pub struct ExitSink(Option<Box<dyn FnOnce(i32) + Send>>);

impl ExitSink {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(i32) + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    /// Sink that drops the code.
    pub fn discard() -> Self {
        Self(None)
    }

    /// Sink paired with a receiver the driver can await.
    pub fn channel() -> (Self, oneshot::Receiver<i32>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self::new(move |code| {
            let _ = tx.send(code);
        });
        (sink, rx)
    }

    pub fn deliver(mut self, code: i32) {
        if let Some(f) = self.0.take() {
            f(code);
        }
    }
}

impl Default for ExitSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for ExitSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() {
            "ExitSink(<fn>)"
        } else {
            "ExitSink(discard)"
        })
    }
}

/// Local end of a session.
///
/// Streams are boxed so in-process callers and a network driver (session frames) can hand the
/// same shape to the tunnel.
pub struct LocalIo {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
    pub terminal: Arc<dyn Terminal>,
    /// Terminal size notifications. Only consumed when the session has a terminal.
    pub resizes: BoxStream<'static, TerminalSize>,
    /// Local signal notifications. Only consumed when the session has a terminal.
    pub signals: BoxStream<'static, LocalSignal>,
    pub exit: ExitSink,
}

impl LocalIo {
    /// Plain streams with no terminal, no notifications and a discarding exit sink.
    pub fn new<I, O, E>(stdin: I, stdout: O, stderr: E) -> Self
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            terminal: Arc::new(NullTerminal),
            resizes: stream::empty().boxed(),
            signals: stream::empty().boxed(),
            exit: ExitSink::discard(),
        }
    }

    /// Streams that read nothing and discard all output.
    pub fn null() -> Self {
        Self::new(tokio::io::empty(), tokio::io::sink(), tokio::io::sink())
    }

    pub fn with_terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_resizes(mut self, resizes: BoxStream<'static, TerminalSize>) -> Self {
        self.resizes = resizes;
        self
    }

    pub fn with_signals(mut self, signals: BoxStream<'static, LocalSignal>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_exit(mut self, exit: ExitSink) -> Self {
        self.exit = exit;
        self
    }

    /// Take the exit sink, leaving a discarding one behind.
    pub fn take_exit(&mut self) -> ExitSink {
        std::mem::take(&mut self.exit)
    }
}

impl fmt::Debug for LocalIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIo")
            .field("terminal_size", &self.terminal.size())
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}
