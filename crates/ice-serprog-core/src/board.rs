//! Board collaborator: FPGA reset line and millisecond delays
//!
//! Only the pin-state sequencing uses this; it never sits on the
//! per-command hot path.

use maybe_async::maybe_async;

/// Board-level control the engine needs around bus handover
#[maybe_async(AFIT)]
pub trait Board {
    /// Drive the FPGA CRESET line (low holds the FPGA in reset)
    fn set_creset(&mut self, high: bool);

    /// Sleep for `ms` milliseconds
    async fn delay_ms(&mut self, ms: u32);

    /// Sample the FPGA CDONE line, if the board wires it up
    fn cdone(&mut self) -> Option<bool> {
        None
    }
}
