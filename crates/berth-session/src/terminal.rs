//! Local terminal control.
//!
//! The tunnel never touches a tty itself: it asks a [`Terminal`] to change mode. Framed sessions
//! use [`crate::FrameTerminal`], which hands the request to the client owning the tty.
use berth_model::TerminalSize;

use crate::SessionError;

/// Terminal whose mode the tunnel may switch while a session is active.
pub trait Terminal: Send + Sync {
    /// Enter (`true`) or leave (`false`) raw mode. Leaving when not raw is a no-op.
    fn set_raw(&self, raw: bool) -> Result<(), SessionError>;

    /// Current size, if known.
    fn size(&self) -> Option<TerminalSize>;
}

/// Terminal that ignores mode changes. Used when there is no local tty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTerminal;

impl Terminal for NullTerminal {
    fn set_raw(&self, _raw: bool) -> Result<(), SessionError> {
        Ok(())
    }

    fn size(&self) -> Option<TerminalSize> {
        None
    }
}
