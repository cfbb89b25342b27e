//! Detach-sequence detection over a chunked byte stream.
//!
//! The sequence is Ctrl+P (`0x10`) followed by Ctrl+Q (`0x11`). Only a sequence split across a
//! chunk boundary is recognised: the previous chunk must end with `0x10` and the next one must
//! start with `0x11`. A chunk containing both bytes is forwarded unchanged.

/// Ctrl+P.
pub const CTRL_P: u8 = 0x10;

/// Ctrl+Q.
pub const CTRL_Q: u8 = 0x11;

/// Detector state carried between chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetachState {
    /// Last chunk did not end with Ctrl+P.
    #[default]
    Idle,
    /// Last chunk ended with Ctrl+P.
    SawCtrlP,
    /// Sequence seen; nothing is forwarded anymore.
    Detached,
}

/// Verdict for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Forward the chunk unmodified.
    Forward,
    /// Stop the stream; the chunk must not be forwarded.
    Detach,
}

/// Detach detector for one session. A new session starts with a new detector.
#[derive(Debug, Clone, Default)]
pub struct DetachDetector {
    state: DetachState,
}

impl DetachDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DetachState {
        self.state
    }

    /// Inspect the next stdin chunk.
    ///
    /// Empty chunks leave the state untouched.
    pub fn scan(&mut self, chunk: &[u8]) -> Scan {
        match self.state {
            DetachState::Detached => return Scan::Detach,
            DetachState::SawCtrlP if chunk.first() == Some(&CTRL_Q) => {
                self.state = DetachState::Detached;
                return Scan::Detach;
            }
            _ => {}
        }
        if let Some(&last) = chunk.last() {
            self.state = if last == CTRL_P {
                DetachState::SawCtrlP
            } else {
                DetachState::Idle
            };
        }
        Scan::Forward
    }
}
