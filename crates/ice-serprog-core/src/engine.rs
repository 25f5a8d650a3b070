//! Serprog protocol engine
//!
//! One logical state: wait for a command byte, run it to completion, flush
//! the response, repeat. The only state carried between commands is the
//! pin state and the advisory SPI clock.
//!
//! Uses `maybe_async` to support both sync and async modes:
//! - With `is_sync` feature: blocking/synchronous
//! - Without `is_sync` feature: async (for Embassy)

use crate::bitbang::BitbangSpiMaster;
use crate::board::Board;
use crate::config::Config;
use crate::error::Result;
use crate::flash::SpiFlash;
use crate::protocol::*;
use crate::transport::Transport;
use maybe_async::maybe_async;

/// Size of the scratch buffer O_SPIOP data is staged through
pub const SCRATCH_SIZE: usize = 4096;

/// Device-side serprog engine
///
/// Owns the transport, the flash bus and the board controls. Several
/// engines can coexist (one per transport), which is what the tests do.
pub struct Serprog<T, M, B> {
    transport: T,
    flash: SpiFlash<M>,
    board: B,
    config: Config,
    pgmname: [u8; PGMNAME_SIZE],
    /// Whether the MCU currently drives the flash bus
    pin_state: bool,
    /// Advisory SPI clock in Hz
    baud: u32,
    buf: [u8; SCRATCH_SIZE],
}

impl<T, M, B> Serprog<T, M, B> {
    /// Create an engine; the bus starts released
    pub fn new(transport: T, flash: SpiFlash<M>, board: B, config: Config) -> Self {
        let pgmname = pgmname_field(config.pgmname);
        let baud = config.spi_freq_hz;
        Self {
            transport,
            flash,
            board,
            config,
            pgmname,
            pin_state: false,
            baud,
            buf: [0; SCRATCH_SIZE],
        }
    }

    /// Whether the flash bus is currently driven by us
    pub fn pin_state(&self) -> bool {
        self.pin_state
    }

    /// Advisory SPI clock reported to the host
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Access the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Mutable access to the flash controller
    pub fn flash_mut(&mut self) -> &mut SpiFlash<M> {
        &mut self.flash
    }

    /// Access the board
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Tear the engine apart
    pub fn into_parts(self) -> (T, SpiFlash<M>, B) {
        (self.transport, self.flash, self.board)
    }
}

impl<T: Transport, M: BitbangSpiMaster, B: Board> Serprog<T, M, B> {
    /// Power-on sequence
    ///
    /// Holds the FPGA in reset, reads the flash ID, then releases the bus and
    /// lets the FPGA boot from it. Returns the JEDEC ID read on the way.
    #[maybe_async]
    pub async fn start(&mut self) -> (u8, u16) {
        self.flash.deinit();
        self.board.set_creset(false);
        self.flash.init();
        self.flash.wakeup();

        let (manufacturer, device) = self.flash.read_jedec_id();
        log::info!(
            "serprog: flash JEDEC ID {:02X} {:04X}",
            manufacturer,
            device
        );

        self.disable_spi().await;
        (manufacturer, device)
    }

    /// Serve commands until the transport fails
    #[maybe_async]
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.step().await?;
        }
    }

    /// Read, execute and answer a single command
    #[maybe_async]
    pub async fn step(&mut self) -> Result<()> {
        let byte = self.transport.read_byte().await?;
        match Command::from_byte(byte) {
            Some(cmd) => self.handle(cmd).await?,
            None if byte == LEGACY_RDID => self.ack().await?,
            None => {
                log::debug!("serprog: unsupported command 0x{:02X}", byte);
                self.nak().await?;
            }
        }
        self.transport.flush().await
    }

    #[maybe_async]
    async fn handle(&mut self, cmd: Command) -> Result<()> {
        log::trace!("serprog: {:?}", cmd);

        match cmd {
            Command::Nop => self.ack().await,
            Command::QueryIface => {
                self.ack().await?;
                self.transport
                    .write_all(&SERPROG_PROTOCOL_VERSION.to_le_bytes())
                    .await
            }
            Command::QueryCmdMap => {
                self.ack().await?;
                self.transport
                    .write_all(SUPPORTED_COMMANDS.as_bytes())
                    .await
            }
            Command::QueryPgmName => {
                self.ack().await?;
                self.transport.write_all(&self.pgmname).await
            }
            Command::QuerySerBuf => {
                self.ack().await?;
                self.transport
                    .write_all(&self.config.serbuf_size.to_le_bytes())
                    .await
            }
            Command::QueryBusType => {
                self.ack().await?;
                self.transport.write_byte(BusType::SPI.bits()).await
            }
            Command::SyncNop => {
                self.nak().await?;
                self.ack().await
            }
            Command::SetBusType => {
                let requested = BusType::from_bits_truncate(self.transport.read_byte().await?);
                if requested.contains(BusType::SPI) {
                    self.ack().await
                } else {
                    log::debug!("serprog: rejecting bus type {:?}", requested);
                    self.nak().await
                }
            }
            Command::SpiOp => self.spi_op().await,
            Command::SetSpiFreq => self.set_spi_freq().await,
            Command::SetPinState => {
                let enable = self.transport.read_byte().await? != 0;
                self.set_pin_state(enable).await;
                self.ack().await
            }
        }
    }

    #[maybe_async]
    async fn ack(&mut self) -> Result<()> {
        self.transport.write_byte(S_ACK).await
    }

    #[maybe_async]
    async fn nak(&mut self) -> Result<()> {
        self.transport.write_byte(S_NAK).await
    }

    #[maybe_async]
    async fn set_spi_freq(&mut self) -> Result<()> {
        let mut raw = [0u8; 4];
        self.transport.read_exact(&mut raw).await?;
        let want = u32::from_le_bytes(raw);

        // 0 Hz is reserved
        if want == 0 {
            return self.nak().await;
        }

        if let Some(actual) = self.flash.spi().master_mut().set_frequency(want) {
            self.baud = actual;
        }
        log::debug!(
            "serprog: requested SPI frequency {} Hz, using {} Hz",
            want,
            self.baud
        );

        self.ack().await?;
        self.transport.write_all(&self.baud.to_le_bytes()).await
    }

    #[maybe_async]
    async fn set_pin_state(&mut self, enable: bool) {
        log::info!(
            "serprog: {} flash bus",
            if enable { "taking" } else { "releasing" }
        );
        if enable {
            self.enable_spi().await;
        } else {
            self.disable_spi().await;
        }
    }

    /// Hold the FPGA in reset and take over the flash bus
    #[maybe_async]
    async fn enable_spi(&mut self) {
        self.board.set_creset(false);
        self.board.delay_ms(self.config.reset_pulse_ms).await;
        self.flash.init();
        self.flash.wakeup();
        self.pin_state = true;
    }

    /// Release the flash bus and restart the FPGA from it
    #[maybe_async]
    async fn disable_spi(&mut self) {
        let pulse = self.config.reset_pulse_ms;

        if self.config.sleep_on_release && self.pin_state {
            self.flash.sleep();
        }
        self.flash.deinit();
        self.pin_state = false;

        self.board.delay_ms(pulse).await;
        self.board.set_creset(true);
        self.board.delay_ms(pulse).await;
        self.board.set_creset(false);
        self.board.delay_ms(pulse).await;
        self.board.set_creset(true);

        if let Some(done) = self.board.cdone() {
            log::info!(
                "serprog: FPGA {}",
                if done { "configured" } else { "not configured" }
            );
        }
    }

    #[maybe_async]
    async fn spi_op(&mut self) -> Result<()> {
        let mut header = [0u8; 6];
        self.transport.read_exact(&mut header).await?;
        let wlen = u24_from_le([header[0], header[1], header[2]]) as usize;
        let rlen = u24_from_le([header[3], header[4], header[5]]) as usize;

        log::trace!("serprog: SPI op write={} read={}", wlen, rlen);
        if !self.pin_state {
            log::debug!("serprog: SPI op while the bus is released");
        }

        // CS spans both phases and is dropped exactly once, even if the
        // host vanishes halfway through.
        self.flash.spi().select();
        let result = self.spi_op_phases(wlen, rlen).await;
        self.flash.spi().deselect();
        result
    }

    #[maybe_async]
    async fn spi_op_phases(&mut self, mut wlen: usize, mut rlen: usize) -> Result<()> {
        while wlen > 0 {
            let cur = core::cmp::min(wlen, SCRATCH_SIZE);
            self.transport.read_exact(&mut self.buf[..cur]).await?;
            self.flash.spi().write(&self.buf[..cur]);
            wlen -= cur;
        }

        self.ack().await?;

        while rlen > 0 {
            let cur = core::cmp::min(rlen, SCRATCH_SIZE);
            self.flash.spi().transfer(0x00, &mut self.buf[..cur]);
            self.transport.write_all(&self.buf[..cur]).await?;
            rlen -= cur;
        }

        Ok(())
    }
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::*;
    use crate::bitbang::SoftSpi;
    use crate::error::Error;
    use std::vec::Vec;

    /// Feeds a fixed request script, collects responses
    struct Script {
        input: Vec<u8>,
        pos: usize,
        output: Vec<u8>,
        flushes: usize,
    }

    impl Script {
        fn new(input: &[u8]) -> Self {
            Self {
                input: input.to_vec(),
                pos: 0,
                output: Vec::new(),
                flushes: 0,
            }
        }
    }

    impl Transport for Script {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.pos >= self.input.len() {
                return Err(Error::Disconnected);
            }
            let n = core::cmp::min(buf.len(), self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            self.output.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    /// Pins that go nowhere, MISO floats high
    struct Floating {
        cs_edges: usize,
        cs: bool,
        freq: Option<u32>,
    }

    impl BitbangSpiMaster for Floating {
        fn set_cs(&mut self, active: bool) {
            if active != self.cs {
                self.cs_edges += 1;
            }
            self.cs = active;
        }
        fn set_sck(&mut self, _high: bool) {}
        fn set_mosi(&mut self, _high: bool) {}
        fn get_miso(&mut self) -> bool {
            true
        }
        fn half_period_delay(&mut self) {}
        fn delay_us(&mut self, _us: u32) {}
        fn set_frequency(&mut self, hz: u32) -> Option<u32> {
            self.freq.map(|max| hz.min(max))
        }
    }

    #[derive(Default)]
    struct NullBoard {
        creset: Vec<bool>,
    }

    impl Board for NullBoard {
        fn set_creset(&mut self, high: bool) {
            self.creset.push(high);
        }
        fn delay_ms(&mut self, _ms: u32) {}
    }

    fn engine(input: &[u8], freq: Option<u32>) -> Serprog<Script, Floating, NullBoard> {
        let pins = Floating {
            cs_edges: 0,
            cs: false,
            freq,
        };
        Serprog::new(
            Script::new(input),
            SpiFlash::new(SoftSpi::new(pins)),
            NullBoard::default(),
            Config::default(),
        )
    }

    fn run_script(input: &[u8]) -> Vec<u8> {
        let mut e = engine(input, None);
        assert_eq!(e.run(), Err(Error::Disconnected));
        e.transport().output.clone()
    }

    #[test]
    fn test_simple_queries() {
        assert_eq!(run_script(&[0x00]), [S_ACK]);
        assert_eq!(run_script(&[0x01]), [S_ACK, 0x01, 0x00]);
        assert_eq!(run_script(&[0x04]), [S_ACK, 0xFF, 0xFF]);
        assert_eq!(run_script(&[0x05]), [S_ACK, 0x08]);
        assert_eq!(run_script(&[0x10]), [S_NAK, S_ACK]);
    }

    #[test]
    fn test_pgmname() {
        let out = run_script(&[0x03]);
        assert_eq!(out[0], S_ACK);
        assert_eq!(&out[1..], b"pico-ice-serprog");
    }

    #[test]
    fn test_cmdmap() {
        let out = run_script(&[0x02]);
        assert_eq!(out.len(), 1 + CMDMAP_SIZE);
        assert_eq!(&out[1..], SUPPORTED_COMMANDS.as_bytes());
    }

    #[test]
    fn test_unknown_and_legacy_rdid() {
        // unknown bytes consume nothing further: the 0x00 after each is a NOP
        assert_eq!(
            run_script(&[0x06, 0x00, 0x9F, 0x00, 0xFF]),
            [S_NAK, S_ACK, S_ACK, S_ACK, S_NAK]
        );
    }

    #[test]
    fn test_every_unsupported_byte() {
        let unsupported = (0..=255u8).filter(|&b| Command::from_byte(b).is_none());
        let mut seen = 0;

        for byte in unsupported {
            let mut e = engine(&[byte, 0x00], None);
            e.step().unwrap();

            let expected = if byte == LEGACY_RDID { S_ACK } else { S_NAK };
            assert_eq!(e.transport().output, [expected], "byte {:#04x}", byte);
            assert_eq!(e.transport().pos, 1, "byte {:#04x}", byte);
            assert!(!e.pin_state());
            seen += 1;
        }

        assert_eq!(seen, 256 - Command::ALL.len());
    }

    #[test]
    fn test_bustype() {
        assert_eq!(run_script(&[0x12, 0x08, 0x12, 0x0F]), [S_ACK, S_ACK]);
        assert_eq!(run_script(&[0x12, 0x00, 0x00]), [S_NAK, S_ACK]);
    }

    #[test]
    fn test_spi_freq_fixed_clock() {
        let out = run_script(&[0x14, 0x40, 0x42, 0x0F, 0x00]);
        let mut expected = Vec::from([S_ACK]);
        expected.extend_from_slice(&12_000_000u32.to_le_bytes());
        assert_eq!(out, expected);

        assert_eq!(run_script(&[0x14, 0, 0, 0, 0]), [S_NAK]);
    }

    #[test]
    fn test_spi_freq_tunable_clock() {
        let mut e = engine(&[0x14, 0x00, 0x09, 0x3D, 0x00], Some(2_000_000));
        e.step().unwrap();
        let mut expected = Vec::from([S_ACK]);
        expected.extend_from_slice(&2_000_000u32.to_le_bytes());
        assert_eq!(e.transport().output, expected);
        assert_eq!(e.baud(), 2_000_000);
    }

    #[test]
    fn test_pin_state_sequencing() {
        let mut e = engine(&[0x15, 0x01, 0x15, 0x00], None);
        e.step().unwrap();
        assert!(e.pin_state());
        assert_eq!(e.board().creset, [false]);

        e.step().unwrap();
        assert!(!e.pin_state());
        assert_eq!(e.board().creset, [false, true, false, true]);
        assert_eq!(e.transport().output, [S_ACK, S_ACK]);
    }

    #[test]
    fn test_spi_op_read_only() {
        let mut e = engine(&[0x13, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x9F], None);
        e.step().unwrap();
        assert_eq!(e.transport().output, [S_ACK, 0xFF, 0xFF]);
        assert_eq!(e.transport().flushes, 1);
    }

    #[test]
    fn test_spi_op_deselects_on_disconnect() {
        // write length 4, only 2 payload bytes arrive
        let mut e = engine(&[0x13, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x06], None);
        assert_eq!(e.step(), Err(Error::Disconnected));
        assert!(e.transport().output.is_empty());
        let (_, flash, _) = e.into_parts();
        let pins = flash.into_inner().into_inner();
        assert_eq!(pins.cs_edges, 2);
        assert!(!pins.cs);
    }
}
