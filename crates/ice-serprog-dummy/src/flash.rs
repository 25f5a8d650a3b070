//! Pin-level SPI NOR flash emulator
//!
//! [`DummyFlash`] implements [`BitbangSpiMaster`] by playing the part of
//! the flash chip at the other end of the wires: it samples MOSI on rising
//! SCK edges, reassembles bytes, runs them through a JEDEC command decoder
//! and presents its answer on MISO, changing it on falling edges (SPI mode
//! 0). Every chip-select window is counted so tests can check framing.

use ice_serprog_core::opcodes;
use ice_serprog_core::BitbangSpiMaster;

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Sector size for smallest erase
    pub sector_size: usize,
    /// Status reads that report busy after each program or erase
    pub busy_polls: u32,
    /// Never leave the busy state once entered
    pub stuck_busy: bool,
    /// Highest clock the emulated wiring can do; `None` means fixed clock
    pub max_sck_hz: Option<u32>,
    /// Keep the MOSI bytes of every chip-select window
    pub record_windows: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0xEF, // Winbond
            device_id: 0x4018,     // W25Q128FV
            size: 16 * 1024 * 1024,
            page_size: 256,
            sector_size: 4096,
            busy_polls: 2,
            stuck_busy: false,
            max_sck_hz: None,
            record_windows: false,
        }
    }
}

/// What the bus has seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Chip-select assertions
    pub selects: usize,
    /// Chip-select deassertions
    pub deselects: usize,
    /// Bytes clocked while selected
    pub clocked_bytes: usize,
    /// Bytes clocked in each completed window
    pub window_lens: Vec<usize>,
    /// MOSI bytes of each completed window, when recording
    pub windows: Vec<Vec<u8>>,
    /// Accumulated `delay_us` time
    pub delayed_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opcode,
    Address { opcode: u8, got: u8, addr: u32 },
    Read { addr: usize },
    Program { base: usize, offset: usize },
    Status,
    JedecId { index: usize },
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    SectorErase(usize),
    ChipErase,
    Program,
    Sleep,
}

/// Emulated flash chip wired to a bit-bang SPI master
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,

    // wires
    driven: bool,
    cs: bool,
    sck: bool,
    mosi: bool,
    miso: bool,

    // shift registers
    shift_in: u8,
    shift_out: u8,
    bits: u8,
    window_bytes: usize,
    window: Vec<u8>,

    // chip state
    phase: Phase,
    pending: Pending,
    page_buf: Vec<(usize, u8)>,
    write_enabled: bool,
    busy: u32,
    powered_down: bool,

    stats: BusStats,
}

impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            driven: false,
            cs: false,
            sck: false,
            mosi: false,
            miso: true,
            shift_in: 0,
            shift_out: 0xFF,
            bits: 0,
            window_bytes: 0,
            window: Vec::new(),
            phase: Phase::Opcode,
            pending: Pending::None,
            page_buf: Vec::new(),
            write_enabled: false,
            busy: 0,
            powered_down: false,
            stats: BusStats::default(),
        }
    }

    /// Create a new dummy flash with default configuration (W25Q128FV)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Bus statistics collected so far
    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    /// Forget collected statistics
    pub fn clear_stats(&mut self) {
        self.stats = BusStats::default();
    }

    /// Whether the master is currently driving the bus
    pub fn is_driven(&self) -> bool {
        self.driven
    }

    /// Whether the chip is in deep power-down
    pub fn is_powered_down(&self) -> bool {
        self.powered_down
    }

    fn status(&self) -> u8 {
        let mut sr = 0;
        if self.busy > 0 {
            sr |= opcodes::SR1_WIP;
        }
        if self.write_enabled {
            sr |= opcodes::SR1_WEL;
        }
        sr
    }

    fn busy_latched(&self) -> bool {
        self.busy == u32::MAX
    }

    fn start_busy(&mut self) {
        self.busy = if self.config.stuck_busy {
            u32::MAX
        } else {
            self.config.busy_polls
        };
    }

    fn begin_window(&mut self) {
        self.stats.selects += 1;
        self.bits = 0;
        self.window_bytes = 0;
        self.window.clear();
        self.phase = Phase::Opcode;
        self.pending = Pending::None;
        self.page_buf.clear();
        self.shift_out = 0xFF;
        self.miso = true;
    }

    fn end_window(&mut self) {
        self.stats.deselects += 1;
        self.stats.window_lens.push(self.window_bytes);
        if self.config.record_windows {
            self.stats.windows.push(core::mem::take(&mut self.window));
        }

        match core::mem::replace(&mut self.pending, Pending::None) {
            Pending::None => {}
            Pending::SectorErase(addr) => {
                if self.write_enabled {
                    let size = self.config.sector_size;
                    let start = addr & !(size - 1);
                    let end = core::cmp::min(start + size, self.data.len());
                    self.data[start..end].fill(0xFF);
                    self.write_enabled = false;
                    self.start_busy();
                }
            }
            Pending::ChipErase => {
                if self.write_enabled {
                    self.data.fill(0xFF);
                    self.write_enabled = false;
                    self.start_busy();
                }
            }
            Pending::Program => {
                if self.write_enabled {
                    // Flash programming: can only change 1 -> 0
                    for &(addr, byte) in &self.page_buf {
                        self.data[addr] &= byte;
                    }
                    self.write_enabled = false;
                    self.start_busy();
                }
            }
            Pending::Sleep => self.powered_down = true,
        }
        self.page_buf.clear();
        self.miso = true;
    }

    /// Consume one byte from MOSI, return the next byte for MISO
    fn on_byte(&mut self, byte: u8) -> u8 {
        self.stats.clocked_bytes += 1;
        self.window_bytes += 1;
        if self.config.record_windows {
            self.window.push(byte);
        }

        match self.phase {
            Phase::Opcode => self.on_opcode(byte),
            Phase::Address { opcode, got, addr } => {
                let addr = (addr << 8) | byte as u32;
                if got < 2 {
                    self.phase = Phase::Address {
                        opcode,
                        got: got + 1,
                        addr,
                    };
                    return 0xFF;
                }
                let addr = addr as usize % self.data.len();
                match opcode {
                    opcodes::READ => {
                        self.phase = Phase::Read { addr: addr + 1 };
                        self.data[addr]
                    }
                    opcodes::PP => {
                        self.phase = Phase::Program {
                            base: addr & !(self.config.page_size - 1),
                            offset: addr & (self.config.page_size - 1),
                        };
                        self.pending = Pending::Program;
                        0xFF
                    }
                    opcodes::SE_20 => {
                        self.pending = Pending::SectorErase(addr);
                        self.phase = Phase::Ignore;
                        0xFF
                    }
                    _ => {
                        self.phase = Phase::Ignore;
                        0xFF
                    }
                }
            }
            Phase::Read { addr } => {
                let addr = addr % self.data.len();
                self.phase = Phase::Read { addr: addr + 1 };
                self.data[addr]
            }
            Phase::Program { base, offset } => {
                // Page program wraps inside the page
                let offset = offset % self.config.page_size;
                self.page_buf.push((base + offset, byte));
                self.phase = Phase::Program {
                    base,
                    offset: offset + 1,
                };
                0xFF
            }
            Phase::Status => {
                // The status byte just clocked out counts as one poll
                self.consume_busy();
                self.status()
            }
            Phase::JedecId { index } => {
                self.phase = Phase::JedecId { index: index + 1 };
                self.jedec_byte(index + 1)
            }
            Phase::Ignore => 0xFF,
        }
    }

    fn on_opcode(&mut self, opcode: u8) -> u8 {
        if self.powered_down {
            if opcode == opcodes::RDP {
                self.powered_down = false;
            }
            self.phase = Phase::Ignore;
            return 0xFF;
        }

        // A busy chip only answers status reads
        if self.busy > 0 && opcode != opcodes::RDSR {
            self.phase = Phase::Ignore;
            return 0xFF;
        }

        match opcode {
            opcodes::WREN => {
                self.write_enabled = true;
                self.phase = Phase::Ignore;
                0xFF
            }
            opcodes::RDSR => {
                self.phase = Phase::Status;
                self.status()
            }
            opcodes::RDID => {
                self.phase = Phase::JedecId { index: 0 };
                self.jedec_byte(0)
            }
            opcodes::READ | opcodes::PP | opcodes::SE_20 => {
                self.phase = Phase::Address {
                    opcode,
                    got: 0,
                    addr: 0,
                };
                0xFF
            }
            opcodes::CE_C7 | opcodes::CE_60 => {
                self.pending = Pending::ChipErase;
                self.phase = Phase::Ignore;
                0xFF
            }
            opcodes::DP => {
                self.pending = Pending::Sleep;
                self.phase = Phase::Ignore;
                0xFF
            }
            _ => {
                log::trace!("dummy: ignoring opcode 0x{:02X}", opcode);
                self.phase = Phase::Ignore;
                0xFF
            }
        }
    }

    fn consume_busy(&mut self) {
        if self.busy > 0 && !self.busy_latched() {
            self.busy -= 1;
        }
    }

    fn jedec_byte(&self, index: usize) -> u8 {
        match index {
            0 => self.config.manufacturer_id,
            1 => (self.config.device_id >> 8) as u8,
            2 => self.config.device_id as u8,
            _ => 0xFF,
        }
    }
}

impl BitbangSpiMaster for DummyFlash {
    fn set_cs(&mut self, active: bool) {
        if !self.driven || active == self.cs {
            return;
        }
        self.cs = active;
        if active {
            self.begin_window();
        } else {
            self.end_window();
        }
    }

    fn set_sck(&mut self, high: bool) {
        if !self.driven || high == self.sck {
            return;
        }
        self.sck = high;
        if !self.cs {
            return;
        }

        if high {
            // Rising edge: sample MOSI
            self.shift_in = (self.shift_in << 1) | self.mosi as u8;
            self.bits += 1;
            if self.bits == 8 {
                self.bits = 0;
                self.shift_out = self.on_byte(self.shift_in);
            }
        } else {
            // Falling edge: present the next output bit
            self.miso = (self.shift_out >> (7 - self.bits)) & 1 != 0;
        }
    }

    fn set_mosi(&mut self, high: bool) {
        if self.driven {
            self.mosi = high;
        }
    }

    fn get_miso(&mut self) -> bool {
        if self.cs {
            self.miso
        } else {
            true
        }
    }

    fn half_period_delay(&mut self) {}

    fn delay_us(&mut self, us: u32) {
        self.stats.delayed_us += us as u64;
    }

    fn request_bus(&mut self) {
        self.driven = true;
    }

    fn release_bus(&mut self) {
        if self.cs {
            self.end_window();
        }
        self.driven = false;
        self.cs = false;
        self.sck = false;
    }

    fn set_frequency(&mut self, hz: u32) -> Option<u32> {
        self.config.max_sck_hz.map(|max| hz.min(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ice_serprog_core::config::WaitPolicy;
    use ice_serprog_core::{SoftSpi, SpiFlash, PAGE_SIZE};

    fn flash() -> SpiFlash<DummyFlash> {
        let mut flash = SpiFlash::new(SoftSpi::new(DummyFlash::new_default()));
        flash.init();
        flash
    }

    #[test]
    fn test_read_jedec_id() {
        let mut flash = flash();
        assert_eq!(flash.read_jedec_id(), (0xEF, 0x4018));
    }

    #[test]
    fn test_erase_program_read() {
        let mut flash = flash();
        let mut page = [0u8; PAGE_SIZE];
        for (i, b) in page.iter_mut().enumerate() {
            *b = i as u8 ^ 0x5A;
        }

        flash.erase_sector(0x1000).unwrap();
        flash.program_page(0x1000, &page).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        flash.read(0x1000, &mut buf);
        assert_eq!(buf, page);

        let dummy = flash.spi().master();
        assert_eq!(&dummy.data()[0x1000..0x1100], &page[..]);
        assert!(dummy.data()[0x1100..0x2000].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_program_only_clears_bits() {
        let mut flash = flash();
        flash.program_page(0, &[0x0F; PAGE_SIZE]).unwrap();
        flash.program_page(0, &[0xF3; PAGE_SIZE]).unwrap();

        let mut buf = [0u8; 4];
        flash.read(0, &mut buf);
        assert_eq!(buf, [0x03; 4]);
    }

    #[test]
    fn test_program_without_wren_is_ignored() {
        let mut spi = SoftSpi::new(DummyFlash::new_default());
        spi.master_mut().request_bus();
        spi.select();
        spi.write(&[opcodes::PP, 0, 0, 0, 0x00]);
        spi.deselect();
        assert_eq!(spi.master().data()[0], 0xFF);
    }

    #[test]
    fn test_chip_erase_waits_for_busy() {
        let mut config = DummyConfig::default();
        config.size = 64 * 1024;
        config.busy_polls = 5;
        let mut flash = SpiFlash::new(SoftSpi::new(DummyFlash::with_data(config, &[0u8; 8192])));
        flash.init();

        flash.erase_chip().unwrap();
        let dummy = flash.spi().master();
        assert!(dummy.data().iter().all(|&b| b == 0xFF));
        // five busy polls, each followed by a 1s poll delay
        assert_eq!(dummy.stats().delayed_us, 5_000_000);
    }

    #[test]
    fn test_stuck_busy_times_out() {
        let config = DummyConfig {
            stuck_busy: true,
            ..DummyConfig::default()
        };
        let mut flash = SpiFlash::new(SoftSpi::new(DummyFlash::new(config)));
        flash.init();
        assert_eq!(
            flash.erase_sector(0),
            Err(ice_serprog_core::Error::FlashTimeout)
        );
    }

    #[test]
    fn test_short_wait_on_idle_flash() {
        let mut flash = flash();
        flash.spi().master_mut().clear_stats();

        flash.wait(WaitPolicy::new(10_000, 5_000)).unwrap();
        let stats = flash.spi().master().stats();
        assert_eq!(stats.selects, 1);
        assert_eq!(stats.delayed_us, 0);
    }

    #[test]
    fn test_deep_power_down() {
        let mut flash = flash();
        flash.sleep();
        assert!(flash.spi().master().is_powered_down());
        assert_eq!(flash.read_jedec_id(), (0xFF, 0xFFFF));

        flash.wakeup();
        assert!(!flash.spi().master().is_powered_down());
        assert_eq!(flash.read_jedec_id(), (0xEF, 0x4018));
    }

    #[test]
    fn test_released_bus_is_ignored() {
        let mut flash = flash();
        flash.deinit();
        assert!(!flash.spi().master().is_driven());

        let selects = flash.spi().master().stats().selects;
        let (mfr, _) = flash.read_jedec_id();
        assert_eq!(mfr, 0xFF);
        assert_eq!(flash.spi().master().stats().selects, selects);
    }
}
