//! Bit-banged SPI engine
//!
//! The flash on the board shares its lines with the FPGA, so there is no
//! hardware SPI peripheral to lean on: every bit is clocked by hand through
//! four GPIO-like signals. Pin access is abstracted by [`BitbangSpiMaster`];
//! [`SoftSpi`] turns that into byte transfers.
//!
//! The bus runs in SPI mode 0 (CPOL=0, CPHA=0), MSB first: MOSI changes
//! while SCK is low, both sides sample on the rising edge.

/// Low-level pin operations for a bit-banged SPI master
///
/// Implementations are expected to be infallible: a stuck line is a
/// hardware fault, not something the protocol can recover from.
pub trait BitbangSpiMaster {
    /// Set chip select (CS is active low, so `active=true` means CS=0)
    fn set_cs(&mut self, active: bool);

    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Get MISO line value
    fn get_miso(&mut self) -> bool;

    /// Delay for half a clock period
    fn half_period_delay(&mut self);

    /// Busy-wait for `us` microseconds, used between status polls
    fn delay_us(&mut self, us: u32);

    /// Optional: Set SCK and MOSI atomically (optimization)
    ///
    /// Default implementation calls `set_sck` then `set_mosi`.
    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) {
        self.set_sck(sck);
        self.set_mosi(mosi);
    }

    /// Optional: Set SCK and get MISO atomically (optimization)
    ///
    /// Default implementation calls `set_sck` then `get_miso`.
    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        self.set_sck(sck);
        self.get_miso()
    }

    /// Start driving SCK, MOSI and CS (CS left deasserted)
    fn request_bus(&mut self) {}

    /// Put every bus line in high impedance so another master can drive it
    fn release_bus(&mut self) {}

    /// Retune the bit clock
    ///
    /// Returns the frequency actually achieved, or `None` when the master
    /// has a fixed clock.
    fn set_frequency(&mut self, _hz: u32) -> Option<u32> {
        None
    }
}

/// Byte-level SPI engine on top of a [`BitbangSpiMaster`]
pub struct SoftSpi<M> {
    master: M,
}

impl<M: BitbangSpiMaster> SoftSpi<M> {
    /// Wrap a pin-level master
    pub fn new(master: M) -> Self {
        Self { master }
    }

    /// Assert chip select, SCK parked low
    pub fn select(&mut self) {
        self.master.set_sck(false);
        self.master.set_cs(true);
    }

    /// Deassert chip select, SCK parked low
    pub fn deselect(&mut self) {
        self.master.set_sck(false);
        self.master.set_cs(false);
    }

    /// Shift one byte out and one byte in (MSB first)
    pub fn transfer_byte(&mut self, tx: u8) -> u8 {
        let mut rx = 0u8;
        for i in (0..8).rev() {
            self.master.set_sck_set_mosi(false, (tx >> i) & 1 != 0);
            self.master.half_period_delay();
            rx <<= 1;
            if self.master.set_sck_get_miso(true) {
                rx |= 1;
            }
            self.master.half_period_delay();
        }
        rx
    }

    /// Clock `buf.len()` bytes, sending `tx` each time and storing what comes back
    pub fn transfer(&mut self, tx: u8, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.transfer_byte(tx);
        }
    }

    /// Clock out `data`, discarding received bits
    pub fn write(&mut self, data: &[u8]) {
        for &byte in data {
            self.transfer_byte(byte);
        }
    }

    /// Access the pin-level master
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the pin-level master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Unwrap the pin-level master
    pub fn into_inner(self) -> M {
        self.master
    }
}

/// Delay-loop divider for a requested bit clock
///
/// A bit-banged master that burns `div` iterations per half period runs at
/// no more than `sys_clk_hz / (2 * div)`. Returns `(div, actual_hz)`, with
/// `div` clamped to `1..=65535` and `actual_hz` capped at `max_sck_hz`, the
/// fastest rate the bit loop itself can reach. `actual_hz` is an upper
/// bound: loop and GPIO overhead only ever make the real clock slower.
pub const fn clock_divider(sys_clk_hz: u32, max_sck_hz: u32, hz: u32) -> (u32, u32) {
    let half = sys_clk_hz / 2;
    let hz = if hz == 0 { 1 } else { hz };
    let mut div = half / hz;
    if div < 1 {
        div = 1;
    } else if div > 65535 {
        div = 65535;
    }
    let mut actual = half / div;
    if actual > max_sck_hz {
        actual = max_sck_hz;
    }
    (div, actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYS_CLK: u32 = 125_000_000;
    const MAX_SCK: u32 = 4_000_000;

    #[test]
    fn test_clock_divider() {
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, 1_000_000), (62, 1_008_064));
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, 12_000_000), (5, MAX_SCK));
        // slowest divider for absurdly low requests
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, 1), (65535, 953));
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, 0), (65535, 953));
    }

    #[test]
    fn test_clock_divider_huge_request() {
        let top = u32::from_le_bytes([0x00, 0x00, 0x00, 0x80]);
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, top), (1, MAX_SCK));
        assert_eq!(clock_divider(SYS_CLK, MAX_SCK, u32::MAX), (1, MAX_SCK));
        assert_eq!(clock_divider(u32::MAX, u32::MAX, u32::MAX), (1, u32::MAX / 2));
    }

    /// Loopback master: MISO follows MOSI, records pin activity
    #[derive(Default)]
    struct Loopback {
        cs: bool,
        sck: bool,
        mosi: bool,
        rising_edges: usize,
        cs_changes: usize,
        sampled: [u8; 8],
        nsampled: usize,
    }

    impl BitbangSpiMaster for Loopback {
        fn set_cs(&mut self, active: bool) {
            if self.cs != active {
                self.cs_changes += 1;
            }
            self.cs = active;
        }

        fn set_sck(&mut self, high: bool) {
            if high && !self.sck {
                self.rising_edges += 1;
                let idx = self.nsampled / 8;
                if idx < self.sampled.len() {
                    self.sampled[idx] = (self.sampled[idx] << 1) | self.mosi as u8;
                }
                self.nsampled += 1;
            }
            self.sck = high;
        }

        fn set_mosi(&mut self, high: bool) {
            self.mosi = high;
        }

        fn get_miso(&mut self) -> bool {
            self.mosi
        }

        fn half_period_delay(&mut self) {}

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn test_msb_first_on_rising_edge() {
        let mut spi = SoftSpi::new(Loopback::default());
        spi.select();
        spi.write(&[0xA5, 0x01]);
        spi.deselect();

        let m = spi.master();
        assert_eq!(m.rising_edges, 16);
        assert_eq!(&m.sampled[..2], &[0xA5, 0x01]);
        assert_eq!(m.cs_changes, 2);
        assert!(!m.sck);
    }

    #[test]
    fn test_transfer_reads_back() {
        let mut spi = SoftSpi::new(Loopback::default());
        let mut buf = [0u8; 3];
        spi.select();
        spi.transfer(0x3C, &mut buf);
        spi.deselect();
        assert_eq!(buf, [0x3C; 3]);
    }

    #[test]
    fn test_select_is_idempotent() {
        let mut spi = SoftSpi::new(Loopback::default());
        spi.select();
        spi.select();
        assert_eq!(spi.master().cs_changes, 1);
        spi.deselect();
        spi.deselect();
        assert_eq!(spi.master().cs_changes, 2);
    }
}
