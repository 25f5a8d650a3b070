//! ice-serprog-dummy - emulated hardware for the serprog engine
//!
//! Provides everything needed to run [`ice_serprog_core::Serprog`] without a
//! board attached:
//!
//! - [`DummyFlash`]: a SPI NOR flash that answers at the pin level
//! - [`DummyBoard`]: a board that records what happens to CRESET
//! - [`ScriptedHost`]: a transport replaying a fixed request stream
//!
//! The host simulator and the end-to-end tests are both built on these.

pub mod board;
pub mod flash;
pub mod host;

pub use board::DummyBoard;
pub use flash::{BusStats, DummyConfig, DummyFlash};
pub use host::ScriptedHost;
