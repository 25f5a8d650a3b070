//! GPIO bit-bang master for the pico-ice flash bus
//!
//! The flash is shared with the FPGA, so every line is a [`Flex`] pin:
//! outputs while we own the bus, high impedance otherwise.

use embassy_rp::gpio::{Flex, Pin, Pull};
use embassy_rp::Peri;
use embassy_time::{block_for, Duration};
use ice_serprog_core::bitbang::clock_divider;
use ice_serprog_core::BitbangSpiMaster;

use crate::config::{DEFAULT_SPI_FREQ_HZ, MAX_BITBANG_SCK_HZ, SYS_CLK_HZ};

/// Flash bus pins
pub struct FlashPins {
    sck: Flex<'static>,
    mosi: Flex<'static>,
    miso: Flex<'static>,
    cs: Flex<'static>,
    /// NOP iterations per half clock period
    clock_div: u32,
}

/// NOP loop iterations for a half period at `hz`, and the rate that gives
fn divider_for(hz: u32) -> (u32, u32) {
    clock_divider(SYS_CLK_HZ, MAX_BITBANG_SCK_HZ, hz)
}

impl FlashPins {
    /// Claim the four flash pins, all left floating
    pub fn new(
        sck: Peri<'static, impl Pin>,
        mosi: Peri<'static, impl Pin>,
        miso: Peri<'static, impl Pin>,
        cs: Peri<'static, impl Pin>,
    ) -> Self {
        let mut pins = Self {
            sck: Flex::new(sck),
            mosi: Flex::new(mosi),
            miso: Flex::new(miso),
            cs: Flex::new(cs),
            clock_div: divider_for(DEFAULT_SPI_FREQ_HZ).0,
        };
        pins.release_bus();
        pins
    }
}

impl BitbangSpiMaster for FlashPins {
    fn set_cs(&mut self, active: bool) {
        if active {
            self.cs.set_low();
        } else {
            self.cs.set_high();
        }
    }

    fn set_sck(&mut self, high: bool) {
        if high {
            self.sck.set_high();
        } else {
            self.sck.set_low();
        }
    }

    fn set_mosi(&mut self, high: bool) {
        if high {
            self.mosi.set_high();
        } else {
            self.mosi.set_low();
        }
    }

    fn get_miso(&mut self) -> bool {
        self.miso.is_high()
    }

    fn half_period_delay(&mut self) {
        // Each cortex_m::asm::nop() is ~8ns at 125 MHz
        for _ in 0..self.clock_div {
            cortex_m::asm::nop();
        }
    }

    fn delay_us(&mut self, us: u32) {
        block_for(Duration::from_micros(us as u64));
    }

    fn request_bus(&mut self) {
        // Set the level before enabling the driver so CS never glitches low
        self.cs.set_high();
        self.cs.set_as_output();
        self.sck.set_low();
        self.sck.set_as_output();
        self.mosi.set_low();
        self.mosi.set_as_output();
        self.miso.set_as_input();
        self.miso.set_pull(Pull::None);
    }

    fn release_bus(&mut self) {
        for pin in [&mut self.sck, &mut self.mosi, &mut self.miso, &mut self.cs] {
            pin.set_as_input();
            pin.set_pull(Pull::None);
        }
    }

    fn set_frequency(&mut self, hz: u32) -> Option<u32> {
        let (div, actual_hz) = divider_for(hz);
        self.clock_div = div;
        defmt::debug!("SPI clock: requested {} Hz, actual {} Hz", hz, actual_hz);
        Some(actual_hz)
    }
}
