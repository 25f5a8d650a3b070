//! Error types for the simulator

use std::path::PathBuf;

use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimError {
    /// Socket setup or accept failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to load the initial flash image
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Initial image does not fit the emulated chip
    #[error("Image is {len} bytes but the flash is only {size} bytes")]
    ImageTooLarge { len: usize, size: usize },

    /// Failed to write the flash dump
    #[error("Failed to write dump {path}: {source}")]
    DumpWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flash size is not usable for an emulated chip
    #[error("Invalid flash size {0}: must be a non-zero multiple of 4096")]
    InvalidSize(u32),

    /// JEDEC ID does not fit in three bytes
    #[error("Invalid JEDEC ID 0x{0:X}: must fit in 24 bits")]
    InvalidJedecId(u32),
}
