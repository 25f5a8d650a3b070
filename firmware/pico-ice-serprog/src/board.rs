//! FPGA reset and configuration-done lines

use embassy_rp::gpio::{Input, Output};
use embassy_time::Timer;
use ice_serprog_core::Board;

/// The iCE40 side of the pico-ice
pub struct IceBoard {
    creset: Output<'static>,
    cdone: Input<'static>,
}

impl IceBoard {
    pub fn new(creset: Output<'static>, cdone: Input<'static>) -> Self {
        Self { creset, cdone }
    }
}

impl Board for IceBoard {
    fn set_creset(&mut self, high: bool) {
        if high {
            self.creset.set_high();
        } else {
            self.creset.set_low();
        }
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after_millis(ms as u64).await;
    }

    fn cdone(&mut self) -> Option<bool> {
        Some(self.cdone.is_high())
    }
}
