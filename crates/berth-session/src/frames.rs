use std::{
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use berth_model::{SessionFrame, TerminalSize};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::{io::AsyncWrite, sync::mpsc};
use tokio_util::io::StreamReader;
use tracing::trace;

use crate::{ExitSink, LocalIo, SessionError, Terminal};

const STDIN_BUFFER: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Stdout,
    Stderr,
}

/// Output half of a framed session: each write becomes one `stdout`/`stderr` frame.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    tx: mpsc::UnboundedSender<SessionFrame>,
    channel: Channel,
}

impl FrameWriter {
    pub fn stdout(tx: mpsc::UnboundedSender<SessionFrame>) -> Self {
        Self {
            tx,
            channel: Channel::Stdout,
        }
    }

    pub fn stderr(tx: mpsc::UnboundedSender<SessionFrame>) -> Self {
        Self {
            tx,
            channel: Channel::Stderr,
        }
    }
}

impl AsyncWrite for FrameWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let data = buf.to_vec();
        let frame = match self.channel {
            Channel::Stdout => SessionFrame::Stdout { data },
            Channel::Stderr => SessionFrame::Stderr { data },
        };
        match self.tx.send(frame) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session peer is gone",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Terminal living on the far side of a framed session.
///
/// Raw mode requests become `set-raw` frames; the size is the last one the peer reported.
#[derive(Debug)]
pub struct FrameTerminal {
    tx: mpsc::UnboundedSender<SessionFrame>,
    size: Arc<Mutex<Option<TerminalSize>>>,
}

impl Terminal for FrameTerminal {
    fn set_raw(&self, raw: bool) -> Result<(), SessionError> {
        self.tx
            .send(SessionFrame::SetRaw { raw })
            .map_err(|_| SessionError::Terminal("session peer is gone".into()))
    }

    fn size(&self) -> Option<TerminalSize> {
        self.size.lock().ok().and_then(|s| *s)
    }
}

impl LocalIo {
    /// Build a local end driven by session frames.
    ///
    /// `inbound` carries client frames (`stdin`, `stdin-eof`, `signal`, `terminal-size`); every
    /// server frame (`stdout`, `stderr`, `set-raw`, `exit-code`) is sent on `outbound`.
    /// Spawns a demultiplexing task, so it must be called inside a tokio runtime.
    pub fn from_frames(
        mut inbound: mpsc::Receiver<SessionFrame>,
        outbound: mpsc::UnboundedSender<SessionFrame>,
    ) -> Self {
        let (stdin_tx, stdin_rx) = mpsc::channel::<io::Result<Bytes>>(STDIN_BUFFER);
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let size = Arc::new(Mutex::new(None));

        let last_size = Arc::clone(&size);
        tokio::spawn(async move {
            let mut stdin_tx = Some(stdin_tx);
            while let Some(frame) = inbound.recv().await {
                match frame {
                    SessionFrame::Stdin { data } => {
                        if let Some(tx) = &stdin_tx {
                            if tx.send(Ok(Bytes::from(data))).await.is_err() {
                                stdin_tx = None;
                            }
                        }
                    }
                    SessionFrame::StdinEof => stdin_tx = None,
                    SessionFrame::Signal { signal } => {
                        let _ = signal_tx.send(signal);
                    }
                    SessionFrame::TerminalSize { size } => {
                        if let Ok(mut last) = last_size.lock() {
                            *last = Some(size);
                        }
                        let _ = resize_tx.send(size);
                    }
                    other => trace!(?other, "ignoring server-side frame from client"),
                }
            }
        });

        let stdin = StreamReader::new(stream::unfold(stdin_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));
        let resizes = stream::unfold(resize_rx, |mut rx| async move {
            rx.recv().await.map(|size| (size, rx))
        })
        .boxed();
        let signals = stream::unfold(signal_rx, |mut rx| async move {
            rx.recv().await.map(|signal| (signal, rx))
        })
        .boxed();

        let exit_tx = outbound.clone();
        let exit = ExitSink::new(move |code| {
            let _ = exit_tx.send(SessionFrame::ExitCode { code });
        });

        Self {
            stdin: Box::new(Box::pin(stdin)),
            stdout: Box::new(FrameWriter::stdout(outbound.clone())),
            stderr: Box::new(FrameWriter::stderr(outbound.clone())),
            terminal: Arc::new(FrameTerminal {
                tx: outbound,
                size,
            }),
            resizes,
            signals,
            exit,
        }
    }
}
