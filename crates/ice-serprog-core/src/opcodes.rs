//! JEDEC SPI flash opcodes used by the flash control layer
//!
//! Only the single-I/O, 3-byte-address subset is needed: the flash on the
//! board is a 16 MiB-or-smaller part and the host drives anything fancier
//! through raw SPI operations.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;

// ============================================================================
// Status register
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;

/// Status Register 1: Write In Progress / Busy
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read / program / erase
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Page Program with 3-byte address
pub const PP: u8 = 0x02;
/// Sector Erase 4KB with 3-byte address
pub const SE_20: u8 = 0x20;
/// Chip Erase
pub const CE_C7: u8 = 0xC7;
/// Chip Erase (alternate opcode)
pub const CE_60: u8 = 0x60;

// ============================================================================
// Power management
// ============================================================================

/// Deep Power Down
pub const DP: u8 = 0xB9;
/// Release from Deep Power Down
pub const RDP: u8 = 0xAB;
