//! Engine configuration
//!
//! Defaults describe the pico-ice board: a 16-byte programmer name that
//! fits the wire field exactly, a 12 MHz advisory SPI clock and 10 ms
//! FPGA reset pulses.

/// Programmer name reported by Q_PGMNAME
pub const DEFAULT_PGMNAME: &str = "pico-ice-serprog";

/// Advisory SPI clock reported until the host asks for something else
pub const DEFAULT_SPI_FREQ_HZ: u32 = 12_000_000;

/// Serial buffer size reported by Q_SERBUF
pub const DEFAULT_SERBUF_SIZE: u16 = 0xFFFF;

/// Width of each CRESET phase when handing the bus back and forth
pub const DEFAULT_RESET_PULSE_MS: u32 = 10;

/// Busy-wait policy for one class of flash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between status register polls
    pub poll_delay_us: u32,
    /// Give up after this long
    pub timeout_us: u32,
}

impl WaitPolicy {
    /// Create a policy
    pub const fn new(poll_delay_us: u32, timeout_us: u32) -> Self {
        Self {
            poll_delay_us,
            timeout_us,
        }
    }

    /// Number of status polls allowed by this policy
    ///
    /// Always at least one: a deadline shorter than the poll delay still
    /// gets to look at the status register before giving up.
    pub const fn max_polls(&self) -> u32 {
        let polls = if self.poll_delay_us > 0 {
            self.timeout_us / self.poll_delay_us
        } else {
            // Fall back to polling once per microsecond
            self.timeout_us
        };
        if polls == 0 {
            1
        } else {
            polls
        }
    }
}

/// Deadlines for flash busy waits
///
/// Typical values from common NOR datasheets: page program 0.7-5 ms,
/// 4 KiB sector erase 45-400 ms, chip erase anywhere up to a few minutes on
/// large parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashTimeouts {
    /// Page program: poll every 10us, timeout after 10ms
    pub page_program: WaitPolicy,
    /// 4 KiB sector erase: poll every 10ms, timeout after 1s
    pub sector_erase: WaitPolicy,
    /// Chip erase: poll every 1s, timeout after 200s
    pub chip_erase: WaitPolicy,
}

impl Default for FlashTimeouts {
    fn default() -> Self {
        Self {
            page_program: WaitPolicy::new(10, 10_000),
            sector_erase: WaitPolicy::new(10_000, 1_000_000),
            chip_erase: WaitPolicy::new(1_000_000, 200_000_000),
        }
    }
}

/// Protocol engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Programmer name (truncated to 16 bytes on the wire)
    pub pgmname: &'static str,
    /// Serial buffer size advertised to the host
    pub serbuf_size: u16,
    /// Initial advisory SPI clock
    pub spi_freq_hz: u32,
    /// CRESET phase width in milliseconds
    pub reset_pulse_ms: u32,
    /// Put the flash into deep power-down before releasing the bus
    pub sleep_on_release: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pgmname: DEFAULT_PGMNAME,
            serbuf_size: DEFAULT_SERBUF_SIZE,
            spi_freq_hz: DEFAULT_SPI_FREQ_HZ,
            reset_pulse_ms: DEFAULT_RESET_PULSE_MS,
            sleep_on_release: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls() {
        assert_eq!(WaitPolicy::new(10, 10_000).max_polls(), 1_000);
        assert_eq!(WaitPolicy::new(0, 50).max_polls(), 50);
    }

    #[test]
    fn test_max_polls_short_deadline() {
        assert_eq!(WaitPolicy::new(10_000, 5_000).max_polls(), 1);
        assert_eq!(WaitPolicy::new(10, 0).max_polls(), 1);
        assert_eq!(WaitPolicy::new(0, 0).max_polls(), 1);
    }
}
