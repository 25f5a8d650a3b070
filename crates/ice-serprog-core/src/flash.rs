//! SPI NOR flash control layer
//!
//! Common JEDEC command sequences on top of [`SoftSpi`]. Each operation is
//! one or more complete chip-select windows; callers never see opcode or
//! address framing.

use crate::bitbang::{BitbangSpiMaster, SoftSpi};
use crate::config::{FlashTimeouts, WaitPolicy};
use crate::error::{Error, Result};
use crate::opcodes;

/// Native page size of the flash
///
/// Page program wraps within a page, so anything crossing a page boundary
/// silently overwrites the start of the page.
pub const PAGE_SIZE: usize = 256;

/// Smallest erase unit (opcode 0x20)
pub const SECTOR_SIZE: usize = 4096;

/// Encode a 24-bit flash address (big-endian, as flash opcodes expect)
pub fn address_bytes(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

/// Flash attached to a bit-banged SPI bus
pub struct SpiFlash<M> {
    spi: SoftSpi<M>,
    timeouts: FlashTimeouts,
}

impl<M: BitbangSpiMaster> SpiFlash<M> {
    /// Create a flash controller with default busy-wait deadlines
    pub fn new(spi: SoftSpi<M>) -> Self {
        Self::with_timeouts(spi, FlashTimeouts::default())
    }

    /// Create a flash controller with custom busy-wait deadlines
    pub fn with_timeouts(spi: SoftSpi<M>, timeouts: FlashTimeouts) -> Self {
        Self { spi, timeouts }
    }

    /// Take over the bus: drive SCK/MOSI/CS, CS idle high
    pub fn init(&mut self) {
        self.spi.master_mut().request_bus();
        self.spi.deselect();
    }

    /// Hand the bus back: every line high impedance
    pub fn deinit(&mut self) {
        self.spi.deselect();
        self.spi.master_mut().release_bus();
    }

    /// Raw SPI engine, for transactions the flash layer does not model
    pub fn spi(&mut self) -> &mut SoftSpi<M> {
        &mut self.spi
    }

    fn command(&mut self, opcode: u8) {
        self.spi.select();
        self.spi.write(&[opcode]);
        self.spi.deselect();
    }

    fn command_with_address(&mut self, opcode: u8, addr: u32) {
        let a = address_bytes(addr);
        self.spi.write(&[opcode, a[0], a[1], a[2]]);
    }

    /// Send the Write Enable command
    pub fn enable_write(&mut self) {
        self.command(opcodes::WREN);
    }

    /// Read status register 1
    pub fn read_status(&mut self) -> u8 {
        let mut status = [0u8; 1];
        self.spi.select();
        self.spi.write(&[opcodes::RDSR]);
        self.spi.transfer(0x00, &mut status);
        self.spi.deselect();
        status[0]
    }

    /// Read the JEDEC ID
    ///
    /// Returns (manufacturer_id, device_id).
    pub fn read_jedec_id(&mut self) -> (u8, u16) {
        let mut id = [0u8; 3];
        self.spi.select();
        self.spi.write(&[opcodes::RDID]);
        self.spi.transfer(0x00, &mut id);
        self.spi.deselect();
        (id[0], u16::from_be_bytes([id[1], id[2]]))
    }

    /// Poll the status register until the WIP bit clears
    pub fn wait(&mut self, policy: WaitPolicy) -> Result<()> {
        for _ in 0..policy.max_polls() {
            if self.read_status() & opcodes::SR1_WIP == 0 {
                return Ok(());
            }
            if policy.poll_delay_us > 0 {
                self.spi.master_mut().delay_us(policy.poll_delay_us);
            }
        }

        log::warn!(
            "flash still busy after {} us, giving up",
            policy.timeout_us
        );
        Err(Error::FlashTimeout)
    }

    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// No size limit is enforced; the caller chunks.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) {
        self.spi.select();
        self.command_with_address(opcodes::READ, addr);
        self.spi.transfer(0x00, buf);
        self.spi.deselect();
    }

    /// Erase the 4 KiB sector containing `addr`
    pub fn erase_sector(&mut self, addr: u32) -> Result<()> {
        self.enable_write();
        self.spi.select();
        self.command_with_address(opcodes::SE_20, addr);
        self.spi.deselect();
        self.wait(self.timeouts.sector_erase)
    }

    /// Program one full page at `addr`
    ///
    /// `addr` should be page aligned, see [`PAGE_SIZE`].
    pub fn program_page(&mut self, addr: u32, page: &[u8; PAGE_SIZE]) -> Result<()> {
        self.enable_write();
        self.spi.select();
        self.command_with_address(opcodes::PP, addr);
        self.spi.write(page);
        self.spi.deselect();
        self.wait(self.timeouts.page_program)
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> Result<()> {
        self.enable_write();
        self.command(opcodes::CE_C7);
        self.wait(self.timeouts.chip_erase)
    }

    /// Release the flash from deep power-down
    pub fn wakeup(&mut self) {
        self.command(opcodes::RDP);
    }

    /// Put the flash into deep power-down
    pub fn sleep(&mut self) {
        self.command(opcodes::DP);
    }

    /// Unwrap the SPI engine
    pub fn into_inner(self) -> SoftSpi<M> {
        self.spi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every byte clocked in each chip-select window
    struct Recorder {
        cs: bool,
        sck: bool,
        mosi: bool,
        shift: u8,
        bits: u8,
        windows: [[u8; 8]; 4],
        lens: [usize; 4],
        nwindows: usize,
        busy_polls: u32,
        delays: u32,
        requested: bool,
    }

    impl Recorder {
        fn new(busy_polls: u32) -> Self {
            Self {
                cs: false,
                sck: false,
                mosi: false,
                shift: 0,
                bits: 0,
                windows: [[0; 8]; 4],
                lens: [0; 4],
                nwindows: 0,
                busy_polls,
                delays: 0,
                requested: false,
            }
        }

        fn window(&self, i: usize) -> &[u8] {
            &self.windows[i][..self.lens[i].min(8)]
        }
    }

    impl BitbangSpiMaster for Recorder {
        fn set_cs(&mut self, active: bool) {
            if active && !self.cs {
                self.bits = 0;
            }
            if !active && self.cs {
                self.nwindows += 1;
            }
            self.cs = active;
        }

        fn set_sck(&mut self, high: bool) {
            if high && !self.sck && self.cs {
                self.shift = (self.shift << 1) | self.mosi as u8;
                self.bits += 1;
                if self.bits == 8 {
                    let w = self.nwindows % 4;
                    if self.lens[w] < 8 {
                        self.windows[w][self.lens[w]] = self.shift;
                    }
                    self.lens[w] += 1;
                    self.bits = 0;
                }
            }
            self.sck = high;
        }

        fn set_mosi(&mut self, high: bool) {
            self.mosi = high;
        }

        fn get_miso(&mut self) -> bool {
            // Status reads report busy until the budget runs out
            self.busy_polls > 0
        }

        fn half_period_delay(&mut self) {}

        fn delay_us(&mut self, _us: u32) {
            self.delays += 1;
            self.busy_polls = self.busy_polls.saturating_sub(1);
        }

        fn request_bus(&mut self) {
            self.requested = true;
        }

        fn release_bus(&mut self) {
            self.requested = false;
        }
    }

    #[test]
    fn test_address_bytes() {
        assert_eq!(address_bytes(0x12_3456), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_sector_erase_framing() {
        let mut flash = SpiFlash::new(SoftSpi::new(Recorder::new(0)));
        flash.init();
        flash.erase_sector(0x01_2000).unwrap();

        let rec = flash.spi().master();
        assert!(rec.requested);
        assert_eq!(rec.window(0), &[opcodes::WREN]);
        assert_eq!(rec.window(1), &[opcodes::SE_20, 0x01, 0x20, 0x00]);
        assert_eq!(rec.window(2), &[opcodes::RDSR, 0x00]);
        assert_eq!(rec.nwindows, 3);
    }

    #[test]
    fn test_wait_polls_until_ready() {
        let mut flash = SpiFlash::new(SoftSpi::new(Recorder::new(3)));
        flash.wait(WaitPolicy::new(10, 1_000)).unwrap();
        assert_eq!(flash.spi().master().delays, 3);
    }

    #[test]
    fn test_wait_times_out() {
        let mut flash = SpiFlash::new(SoftSpi::new(Recorder::new(u32::MAX)));
        assert_eq!(
            flash.wait(WaitPolicy::new(10, 100)),
            Err(Error::FlashTimeout)
        );
        assert_eq!(flash.spi().master().delays, 10);
    }

    #[test]
    fn test_wait_deadline_below_poll_delay() {
        let mut flash = SpiFlash::new(SoftSpi::new(Recorder::new(0)));
        flash.wait(WaitPolicy::new(10_000, 5_000)).unwrap();

        let rec = flash.spi().master();
        assert_eq!(rec.nwindows, 1);
        assert_eq!(rec.window(0), &[opcodes::RDSR, 0x00]);
        assert_eq!(rec.delays, 0);
    }

    #[test]
    fn test_power_commands() {
        let mut flash = SpiFlash::new(SoftSpi::new(Recorder::new(0)));
        flash.sleep();
        flash.wakeup();
        flash.deinit();
        let rec = flash.spi().master();
        assert_eq!(rec.window(0), &[opcodes::DP]);
        assert_eq!(rec.window(1), &[opcodes::RDP]);
        assert!(!rec.requested);
    }
}
