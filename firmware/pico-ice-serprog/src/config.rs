// Device identity and board wiring.

// =============================================================================
// USB descriptors
// =============================================================================

/// pid.codes test VID/PID used by the pico-ice serprog firmware
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0xB1C0;

pub const USB_MANUFACTURER: &str = "tinyVision.ai";
pub const USB_PRODUCT: &str = "pico-ice serprog";
pub const USB_SERIAL: &str = "00000001";

/// USB max packet size for Full Speed bulk endpoints.
pub const USB_MAX_PACKET_SIZE: u16 = 64;

// =============================================================================
// Pin assignments (RP2040 GPIO numbers, see main.rs for the wiring)
// =============================================================================

pub const PIN_FLASH_SCK: u8 = 14;
pub const PIN_FLASH_MOSI: u8 = 8;
pub const PIN_FLASH_MISO: u8 = 11;
pub const PIN_FLASH_CS: u8 = 9;
pub const PIN_FPGA_CDONE: u8 = 26;
pub const PIN_FPGA_CRESET: u8 = 27;

// =============================================================================
// Bit-bang timing
// =============================================================================

/// Default system clock after `embassy_rp::init`.
pub const SYS_CLK_HZ: u32 = 125_000_000;

/// Fastest SCK the GPIO bit loop reaches with a divider of 1; reported
/// rates never exceed it.
pub const MAX_BITBANG_SCK_HZ: u32 = 4_000_000;

/// Default SPI frequency at power-on (Hz).
pub const DEFAULT_SPI_FREQ_HZ: u32 = ice_serprog_core::config::DEFAULT_SPI_FREQ_HZ;
