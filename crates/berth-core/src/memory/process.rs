//! Scripted remote processes for attach and exec.
use std::sync::Arc;

use berth_session::{NoControl, RemoteIo, RemoteProcess, SessionError};
use futures::FutureExt;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, duplex},
    sync::oneshot,
};
use tracing::trace;

const PIPE_BUFFER: usize = 64 * 1024;
const CHUNK: usize = 8192;

/// What a scripted process does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Program {
    /// Copy stdin to stdout until stdin closes, exit 0.
    Cat,
    /// Print the line and exit 0.
    Echo(String),
    /// Exit with the code, printing nothing.
    Exit(i32),
    /// Print an error and exit 127.
    Missing(String),
}

impl Program {
    /// `cat`, `echo ARGS..`, `true`, `false`, `exit N`; anything else is missing.
    pub(super) fn parse(command: &[String]) -> Self {
        let Some((program, args)) = command.split_first() else {
            return Program::Cat;
        };
        match program.as_str() {
            "cat" | "sh" | "bash" => Program::Cat,
            "echo" => Program::Echo(args.join(" ")),
            "true" => Program::Exit(0),
            "false" => Program::Exit(1),
            "exit" => Program::Exit(args.first().and_then(|a| a.parse().ok()).unwrap_or(0)),
            other => Program::Missing(other.to_string()),
        }
    }
}

/// Copy stdin to stdout until stdin ends.
///
/// Output nobody reads is dropped: a detached reader does not change the exit status, only a
/// failing stdin does.
async fn cat<R, W>(stdin: &mut R, stdout: &mut W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK];
    let mut reader_gone = false;
    loop {
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if reader_gone {
            continue;
        }
        let written = async {
            stdout.write_all(&buf[..n]).await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            trace!(error = %e, "stdout reader gone, discarding output");
            reader_gone = true;
        }
    }
}

pub(super) fn spawn(program: Program) -> RemoteProcess {
    let (stdin_w, mut stdin_r) = duplex(PIPE_BUFFER);
    let (mut stdout_w, stdout_r) = duplex(PIPE_BUFFER);
    let (mut stderr_w, stderr_r) = duplex(PIPE_BUFFER);
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let code = match program {
            Program::Cat => match cat(&mut stdin_r, &mut stdout_w).await {
                Ok(()) => 0,
                Err(_) => 1,
            },
            Program::Echo(line) => {
                if let Err(e) = stdout_w.write_all(format!("{line}\n").as_bytes()).await {
                    trace!(error = %e, "echo output not read");
                }
                0
            }
            Program::Exit(code) => code,
            Program::Missing(cmd) => {
                let _ = stderr_w
                    .write_all(format!("{cmd}: command not found\n").as_bytes())
                    .await;
                127
            }
        };
        drop(stdout_w);
        drop(stderr_w);
        drop(stdin_r);
        let _ = tx.send(code);
    });

    let status = async move {
        rx.await
            .map_err(|_| SessionError::Remote("process vanished".into()))
    }
    .boxed();

    RemoteProcess::new(
        RemoteIo {
            stdin: Some(Box::new(stdin_w)),
            stdout: Box::new(stdout_r),
            stderr: Box::new(stderr_r),
            control: Arc::new(NoControl),
        },
        status,
    )
}
