//! Interactive session plumbing between a local terminal and a remote container process.
//!
//! The [`Tunnel`] binds a [`LocalIo`] (stdin/stdout/stderr plus resize and signal notifications)
//! to a [`RemoteIo`], detects the Ctrl+P Ctrl+Q detach sequence and guarantees terminal state is
//! restored on every exit path through a [`DeferStack`].
mod error;
pub use error::SessionError;

mod detach;
pub use detach::{CTRL_P, CTRL_Q, DetachDetector, DetachState, Scan};

mod cleanup;
pub use cleanup::DeferStack;

mod terminal;
pub use terminal::{NullTerminal, Terminal};

mod local;
pub use local::{ExitSink, LocalIo};

mod frames;
pub use frames::{FrameTerminal, FrameWriter};

mod remote;
pub use remote::{ExitStatus, NoControl, RemoteControl, RemoteIo, RemoteProcess};

mod tunnel;
pub use tunnel::{Completion, DETACH_HINT, Pipe, Tunnel, TunnelOptions};
