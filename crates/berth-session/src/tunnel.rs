use std::{fmt, future::Future, io, sync::Arc};

use berth_model::{LocalSignal, TerminalSize};
use futures::{
    FutureExt, StreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    DeferStack, DetachDetector, LocalIo, RemoteControl, RemoteIo, Scan, SessionError,
};

/// Printed to local stderr before an interactive terminal session starts.
pub const DETACH_HINT: &str = "press Ctrl+P Ctrl+Q to detach";

const STDIN_CHUNK: usize = 8192;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TunnelOptions {
    /// Forward local stdin to the remote process.
    pub interactive: bool,
    /// The remote process runs with a terminal.
    pub terminal: bool,
}

/// Pipe of a tunnel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipe {
    Stdout,
    Stderr,
    Stdin,
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pipe::Stdout => "stdout",
            Pipe::Stderr => "stderr",
            Pipe::Stdin => "stdin",
        })
    }
}

/// Why a tunnel stopped. Passed to every deferred action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The detach sequence was typed; the remote process keeps running.
    Detached,
    /// The first pipe to settle (end of stream or failure).
    Closed(Pipe),
    /// The governing cancellation fired.
    Aborted,
}

enum PipeEnd {
    Eof,
    Detached,
}

type PipeFuture = BoxFuture<'static, (Pipe, io::Result<PipeEnd>)>;

/// Bidirectional session between a [`LocalIo`] and a [`RemoteIo`].
///
/// The tunnel resolves as soon as any one of its pipes settles. Deferred actions (terminal
/// restore, forwarder teardown, plus whatever the caller registered with [`Tunnel::defer`]) run
/// newest first on every exit path.
pub struct Tunnel {
    opts: TunnelOptions,
    cleanup: DeferStack<Completion>,
}

impl Tunnel {
    pub fn new(opts: TunnelOptions) -> Self {
        Self {
            opts,
            cleanup: DeferStack::new(),
        }
    }

    /// Register an action to run when the tunnel ends.
    ///
    /// Actions registered before [`Tunnel::run`] run after the tunnel's own cleanup.
    pub fn defer<F, Fut>(&mut self, label: &'static str, action: F)
    where
        F: FnOnce(Completion) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        self.cleanup.push(label, action);
    }

    /// Pump data until a pipe settles, the detach sequence is typed or `cancel` fires.
    ///
    /// Returns [`SessionError::Aborted`] on cancellation, after cleanup has run. The exit sink of
    /// `local` is not used; callers take it beforehand and deliver the code from a deferred action.
    #[instrument(name = "tunnel", skip_all)]
    pub async fn run(
        mut self,
        remote: RemoteIo,
        local: LocalIo,
        cancel: &CancellationToken,
    ) -> Result<Completion, SessionError> {
        let TunnelOptions {
            interactive,
            terminal,
        } = self.opts;
        debug!(interactive, terminal, "tunnel starting");

        let LocalIo {
            stdin,
            stdout,
            mut stderr,
            terminal: term,
            resizes,
            signals,
            ..
        } = local;

        if terminal && interactive {
            if let Err(e) = write_line(&mut stderr, DETACH_HINT).await {
                debug!(error = %e, "failed to print detach hint");
            }
            if let Err(e) = term.set_raw(true) {
                self.cleanup.unwind(Completion::Aborted).await;
                return Err(e);
            }
            let term = Arc::clone(&term);
            self.cleanup
                .push("restore-terminal", move |_| async move { term.set_raw(false) });
        }

        if terminal {
            let token = cancel.child_token();
            let resizer = tokio::spawn(forward_resizes(
                resizes,
                Arc::clone(&remote.control),
                token.clone(),
            ));
            let signaller = tokio::spawn(forward_signals(
                signals,
                Arc::clone(&remote.control),
                interactive,
                token.clone(),
            ));
            self.cleanup.push("stop-forwarders", move |_| async move {
                token.cancel();
                let _ = resizer.await;
                let _ = signaller.await;
                Ok(())
            });
        }

        let RemoteIo {
            stdin: remote_stdin,
            stdout: remote_stdout,
            stderr: remote_stderr,
            ..
        } = remote;

        let mut pipes: Vec<PipeFuture> = vec![
            copy_out(Pipe::Stdout, remote_stdout, stdout),
            copy_out(Pipe::Stderr, remote_stderr, stderr),
        ];

        // Discarded stdin never ends the tunnel.
        let mut discard: BoxFuture<'static, ()> = match remote_stdin {
            Some(remote_stdin) if interactive => {
                let detector = (terminal && interactive).then(DetachDetector::new);
                pipes.push(pump_stdin(stdin, remote_stdin, detector).boxed());
                future::pending().boxed()
            }
            _ => drain(stdin).boxed(),
        };
        let mut discarding = true;

        let mut race = future::select_all(pipes);
        let settled = loop {
            tokio::select! {
                _ = cancel.cancelled() => break None,
                ((pipe, res), _, _) = &mut race => break Some((pipe, res)),
                _ = &mut discard, if discarding => discarding = false,
            }
        };
        drop(race);
        drop(discard);

        let Some((pipe, res)) = settled else {
            debug!("tunnel aborted");
            self.cleanup.unwind(Completion::Aborted).await;
            return Err(SessionError::Aborted);
        };

        let completion = match res {
            Ok(PipeEnd::Detached) => Completion::Detached,
            Ok(PipeEnd::Eof) => Completion::Closed(pipe),
            Err(e) => {
                warn!(%pipe, error = %e, "pipe failed");
                Completion::Closed(pipe)
            }
        };
        debug!(?completion, "tunnel finished");
        self.cleanup.unwind(completion).await;
        Ok(completion)
    }
}

async fn write_line<W>(w: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

fn copy_out(
    pipe: Pipe,
    mut from: Box<dyn AsyncRead + Send + Unpin>,
    mut to: Box<dyn AsyncWrite + Send + Unpin>,
) -> PipeFuture {
    async move {
        let res: io::Result<PipeEnd> = async {
            let n = tokio::io::copy(&mut from, &mut to).await?;
            to.flush().await?;
            trace!(%pipe, bytes = n, "pipe reached end of stream");
            Ok(PipeEnd::Eof)
        }
        .await;
        (pipe, res)
    }
    .boxed()
}

async fn pump_stdin(
    mut from: Box<dyn AsyncRead + Send + Unpin>,
    mut to: Box<dyn AsyncWrite + Send + Unpin>,
    mut detector: Option<DetachDetector>,
) -> (Pipe, io::Result<PipeEnd>) {
    let res: io::Result<PipeEnd> = async {
        let mut buf = vec![0u8; STDIN_CHUNK];
        loop {
            let n = from.read(&mut buf).await?;
            if n == 0 {
                to.shutdown().await?;
                return Ok(PipeEnd::Eof);
            }
            let chunk = &buf[..n];
            if let Some(d) = detector.as_mut() {
                if d.scan(chunk) == Scan::Detach {
                    return Ok(PipeEnd::Detached);
                }
            }
            to.write_all(chunk).await?;
            to.flush().await?;
        }
    }
    .await;
    (Pipe::Stdin, res)
}

async fn drain(mut from: Box<dyn AsyncRead + Send + Unpin>) {
    if let Err(e) = tokio::io::copy(&mut from, &mut tokio::io::sink()).await {
        trace!(error = %e, "discarded stdin failed");
    }
}

async fn forward_resizes(
    mut resizes: BoxStream<'static, TerminalSize>,
    control: Arc<dyn RemoteControl>,
    token: CancellationToken,
) {
    loop {
        let size = tokio::select! {
            _ = token.cancelled() => break,
            next = resizes.next() => match next {
                Some(size) => size,
                None => break,
            },
        };
        if let Err(e) = control.resize(size).await {
            debug!(cols = size.cols, rows = size.rows, error = %e, "resize not forwarded");
        }
    }
}

async fn forward_signals(
    mut signals: BoxStream<'static, LocalSignal>,
    control: Arc<dyn RemoteControl>,
    interactive: bool,
    token: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = token.cancelled() => break,
            next = signals.next() => match next {
                Some(signal) => signal,
                None => break,
            },
        };
        if !interactive {
            trace!(?signal, "signal ignored for non-interactive session");
            continue;
        }
        if let Err(e) = control.signal(signal.to_remote()).await {
            debug!(?signal, error = %e, "signal not forwarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use berth_model::RemoteSignal;
    use bytes::Bytes;
    use futures::stream;
    use tokio::{
        io::duplex,
        sync::{mpsc, oneshot},
        time::timeout,
    };
    use tokio_util::io::StreamReader;

    use super::*;
    use crate::{NoControl, Terminal};

    #[derive(Default)]
    struct RecordingTerminal(Arc<Mutex<Vec<String>>>);

    impl Terminal for RecordingTerminal {
        fn set_raw(&self, raw: bool) -> Result<(), SessionError> {
            self.0.lock().unwrap().push(format!("raw:{raw}"));
            Ok(())
        }

        fn size(&self) -> Option<TerminalSize> {
            None
        }
    }

    #[derive(Debug, PartialEq)]
    enum Control {
        Resize(TerminalSize),
        Signal(RemoteSignal),
    }

    struct RecordingControl(mpsc::UnboundedSender<Control>);

    #[async_trait]
    impl RemoteControl for RecordingControl {
        async fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
            let _ = self.0.send(Control::Resize(size));
            Ok(())
        }

        async fn signal(&self, signal: RemoteSignal) -> Result<(), SessionError> {
            let _ = self.0.send(Control::Signal(signal));
            Ok(())
        }
    }

    fn remote(
        stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
        stdout: impl AsyncRead + Send + Unpin + 'static,
        stderr: impl AsyncRead + Send + Unpin + 'static,
    ) -> RemoteIo {
        RemoteIo {
            stdin,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            control: Arc::new(NoControl),
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> impl AsyncRead + Send + Unpin + 'static {
        let items: Vec<io::Result<Bytes>> =
            parts.iter().map(|&p| Ok(Bytes::from_static(p))).collect();
        StreamReader::new(stream::iter(items))
    }

    #[tokio::test]
    async fn resolves_when_first_pipe_ends() {
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (_stdin_peer, local_stdin) = duplex(64);
        let (remote_stdin, _remote_stdin_peer) = duplex(64);

        let remote = remote(Some(Box::new(remote_stdin)), tokio::io::empty(), remote_stderr);
        let local = LocalIo::new(local_stdin, tokio::io::sink(), tokio::io::sink());
        let tunnel = Tunnel::new(TunnelOptions {
            interactive: true,
            terminal: false,
        });

        let done = timeout(
            Duration::from_secs(5),
            tunnel.run(remote, local, &CancellationToken::new()),
        )
        .await
        .expect("tunnel must not wait for the open pipes");

        assert_eq!(done.unwrap(), Completion::Closed(Pipe::Stdout));
    }

    #[tokio::test]
    async fn detach_across_chunks_stops_forwarding_and_restores_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, mut remote_stdin_peer) = duplex(64);
        let (local_stderr, mut local_stderr_peer) = duplex(256);

        let remote = remote(Some(Box::new(remote_stdin)), remote_stdout, remote_stderr);
        let local = LocalIo::new(
            chunks(&[b"ab\x10", b"\x11zz", b"never"]),
            tokio::io::sink(),
            local_stderr,
        )
        .with_terminal(Arc::new(RecordingTerminal(Arc::clone(&log))));

        let mut tunnel = Tunnel::new(TunnelOptions {
            interactive: true,
            terminal: true,
        });
        let exit_log = Arc::clone(&log);
        tunnel.defer("exit-code", move |completion| async move {
            exit_log.lock().unwrap().push(format!("exit:{completion:?}"));
            Ok(())
        });

        let done = tunnel
            .run(remote, local, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done, Completion::Detached);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["raw:true", "raw:false", "exit:Detached"]
        );

        let mut forwarded = Vec::new();
        remote_stdin_peer.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"ab\x10");

        let mut hint = String::new();
        local_stderr_peer.read_to_string(&mut hint).await.unwrap();
        assert!(hint.contains(DETACH_HINT));
    }

    #[tokio::test]
    async fn sequence_inside_one_chunk_is_forwarded() {
        let (_stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, mut remote_stdin_peer) = duplex(64);

        let remote = remote(Some(Box::new(remote_stdin)), remote_stdout, remote_stderr);
        let local = LocalIo::new(chunks(&[b"\x10\x11"]), tokio::io::sink(), tokio::io::sink());
        let tunnel = Tunnel::new(TunnelOptions {
            interactive: true,
            terminal: true,
        });

        let done = tunnel
            .run(remote, local, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done, Completion::Closed(Pipe::Stdin));

        let mut forwarded = Vec::new();
        remote_stdin_peer.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"\x10\x11");
    }

    #[tokio::test]
    async fn non_interactive_discards_stdin_and_keeps_output_flowing() {
        let (mut stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, _remote_stdin_peer) = duplex(64);
        let (local_stdout, mut local_stdout_peer) = duplex(64);

        let remote = remote(Some(Box::new(remote_stdin)), remote_stdout, remote_stderr);
        let local = LocalIo::new(tokio::io::empty(), local_stdout, tokio::io::sink());
        let tunnel = Tunnel::new(TunnelOptions::default());

        let run = tokio::spawn(async move {
            tunnel.run(remote, local, &CancellationToken::new()).await
        });

        stdout_peer.write_all(b"hello").await.unwrap();
        drop(stdout_peer);

        let done = run.await.unwrap().unwrap();
        assert_eq!(done, Completion::Closed(Pipe::Stdout));

        let mut out = Vec::new();
        local_stdout_peer.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn forwards_resizes_and_signals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, _remote_stdin_peer) = duplex(64);
        let (_stdin_peer, local_stdin) = duplex(64);

        let size = TerminalSize { cols: 100, rows: 30 };
        let remote = RemoteIo {
            stdin: Some(Box::new(remote_stdin)),
            stdout: Box::new(remote_stdout),
            stderr: Box::new(remote_stderr),
            control: Arc::new(RecordingControl(tx)),
        };
        let local = LocalIo::new(local_stdin, tokio::io::sink(), tokio::io::sink())
            .with_resizes(stream::iter([size]).boxed())
            .with_signals(stream::iter([LocalSignal::Interrupt]).boxed());
        let tunnel = Tunnel::new(TunnelOptions {
            interactive: true,
            terminal: true,
        });

        let run = tokio::spawn(async move {
            tunnel.run(remote, local, &CancellationToken::new()).await
        });

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort_by_key(|c| matches!(c, Control::Signal(_)));
        assert_eq!(
            seen,
            vec![Control::Resize(size), Control::Signal(RemoteSignal::Intr)]
        );

        drop(stdout_peer);
        assert_eq!(
            run.await.unwrap().unwrap(),
            Completion::Closed(Pipe::Stdout)
        );
    }

    #[tokio::test]
    async fn terminal_without_input_forwards_resizes_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, _remote_stdin_peer) = duplex(64);
        let (local_stderr, mut local_stderr_peer) = duplex(256);

        // Resolves once the forwarder has consumed both signals.
        let (consumed_tx, consumed_rx) = oneshot::channel();
        let signals = stream::iter([LocalSignal::Interrupt, LocalSignal::Quit]).chain(
            stream::once(async move {
                let _ = consumed_tx.send(());
            })
            .filter_map(|()| future::ready(None::<LocalSignal>)),
        );

        let size = TerminalSize { cols: 80, rows: 24 };
        let remote = RemoteIo {
            stdin: Some(Box::new(remote_stdin)),
            stdout: Box::new(remote_stdout),
            stderr: Box::new(remote_stderr),
            control: Arc::new(RecordingControl(tx)),
        };
        let local = LocalIo::new(tokio::io::empty(), tokio::io::sink(), local_stderr)
            .with_terminal(Arc::new(RecordingTerminal(Arc::clone(&log))))
            .with_resizes(stream::iter([size]).boxed())
            .with_signals(signals.boxed());
        let tunnel = Tunnel::new(TunnelOptions {
            interactive: false,
            terminal: true,
        });

        let run = tokio::spawn(async move {
            tunnel.run(remote, local, &CancellationToken::new()).await
        });

        assert_eq!(rx.recv().await.unwrap(), Control::Resize(size));
        consumed_rx.await.unwrap();
        drop(stdout_peer);
        assert_eq!(
            run.await.unwrap().unwrap(),
            Completion::Closed(Pipe::Stdout)
        );

        assert!(rx.try_recv().is_err(), "no signal may reach the remote");
        assert!(log.lock().unwrap().is_empty(), "terminal must stay cooked");
        let mut hint = String::new();
        local_stderr_peer.read_to_string(&mut hint).await.unwrap();
        assert!(hint.is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_and_unwinds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_stdout_peer, remote_stdout) = duplex(64);
        let (_stderr_peer, remote_stderr) = duplex(64);
        let (remote_stdin, _remote_stdin_peer) = duplex(64);
        let (_stdin_peer, local_stdin) = duplex(64);

        let remote = remote(Some(Box::new(remote_stdin)), remote_stdout, remote_stderr);
        let local = LocalIo::new(local_stdin, tokio::io::sink(), tokio::io::sink())
            .with_terminal(Arc::new(RecordingTerminal(Arc::clone(&log))));
        let mut tunnel = Tunnel::new(TunnelOptions {
            interactive: true,
            terminal: true,
        });
        let exit_log = Arc::clone(&log);
        tunnel.defer("exit-code", move |completion| async move {
            exit_log.lock().unwrap().push(format!("exit:{completion:?}"));
            Ok(())
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tunnel.run(remote, local, &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Aborted));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["raw:true", "raw:false", "exit:Aborted"]
        );
    }
}
