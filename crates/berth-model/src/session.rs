use serde::{Deserialize, Serialize};

/// Terminal dimensions in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

/// Signal raised on the local side of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalSignal {
    /// `SIGINT`.
    Interrupt,
    /// `SIGQUIT`.
    Quit,
}

impl LocalSignal {
    pub fn to_remote(self) -> RemoteSignal {
        match self {
            LocalSignal::Interrupt => RemoteSignal::Intr,
            LocalSignal::Quit => RemoteSignal::Quit,
        }
    }
}

/// Terminal control signal injected into a remote process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteSignal {
    Intr,
    Quit,
}

/// Message on a multiplexed session channel.
///
/// Client to server: `stdin`, `stdin-eof`, `signal`, `terminal-size`.
/// Server to client: `stdout`, `stderr`, `set-raw`, `exit-code`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionFrame {
    Stdin { data: Vec<u8> },
    StdinEof,
    Stdout { data: Vec<u8> },
    Stderr { data: Vec<u8> },
    SetRaw { raw: bool },
    ExitCode { code: i32 },
    Signal { signal: LocalSignal },
    TerminalSize { size: TerminalSize },
}
