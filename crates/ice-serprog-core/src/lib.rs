//! ice-serprog-core - serprog programmer engine for SPI flash
//!
//! This crate implements the device side of the Serial Flasher Protocol
//! (serprog): it consumes commands from a byte-stream transport, drives a
//! bit-banged SPI bus attached to a NOR flash, and writes the responses
//! back. It is `no_std` so the same engine runs on the RP2040 firmware and
//! in the host-side simulator.
//!
//! # Features
//!
//! - `std` - Enable standard library support (implies `is_sync`)
//! - `is_sync` - Compile the transport and board traits as blocking
//!
//! Without `is_sync` the [`transport::Transport`] and [`board::Board`]
//! traits are async, which is what an Embassy executor wants.
//!
//! # Example
//!
//! ```ignore
//! use ice_serprog_core::{Config, Serprog, SoftSpi, SpiFlash};
//!
//! let flash = SpiFlash::new(SoftSpi::new(pins));
//! let mut engine = Serprog::new(transport, flash, board, Config::default());
//! loop {
//!     if let Err(e) = engine.run().await {
//!         // wait for the host to reconnect
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

#[cfg(feature = "std")]
extern crate std;

pub mod bitbang;
pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod flash;
pub mod opcodes;
pub mod protocol;
pub mod transport;

pub use bitbang::{BitbangSpiMaster, SoftSpi};
pub use board::Board;
pub use config::{Config, FlashTimeouts};
pub use engine::Serprog;
pub use error::{Error, Result};
pub use flash::{SpiFlash, PAGE_SIZE, SECTOR_SIZE};
pub use protocol::{BusType, Command, CommandMap};
pub use transport::Transport;
