//! Simulated board: records the FPGA reset line instead of toggling it

use std::time::Duration;

use ice_serprog_core::Board;

/// Board that logs CRESET activity
#[derive(Debug, Default)]
pub struct DummyBoard {
    creset: bool,
    /// Every level written to CRESET, in order
    pub creset_log: Vec<bool>,
    /// Total requested delay
    pub delayed_ms: u64,
    /// Actually sleep in `delay_ms` (for the interactive simulator)
    pub real_time: bool,
}

impl DummyBoard {
    /// Create a board that only accounts for delays
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a board that really sleeps
    pub fn real_time() -> Self {
        Self {
            real_time: true,
            ..Self::default()
        }
    }

    /// Current CRESET level
    pub fn creset(&self) -> bool {
        self.creset
    }
}

impl Board for DummyBoard {
    fn set_creset(&mut self, high: bool) {
        log::trace!("dummy: CRESET {}", if high { "high" } else { "low" });
        self.creset = high;
        self.creset_log.push(high);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delayed_ms += ms as u64;
        if self.real_time {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }

    fn cdone(&mut self) -> Option<bool> {
        // The emulated FPGA "configures" as soon as it leaves reset
        Some(self.creset)
    }
}
