//! Error types for ice-serprog-core
//!
//! Protocol-level problems (unknown commands, bad bus types) never show up
//! here: they are answered with a NAK on the wire. This type only covers
//! failures the engine cannot answer for itself.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transport reported a read or write failure
    Transport,
    /// The host went away (USB reset, port closed, socket EOF)
    Disconnected,
    /// Flash kept its write-in-progress bit set past the deadline
    FlashTimeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport I/O error"),
            Self::Disconnected => write!(f, "host disconnected"),
            Self::FlashTimeout => write!(f, "flash busy wait timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
