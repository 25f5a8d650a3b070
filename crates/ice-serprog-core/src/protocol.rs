//! Serprog protocol constants and types
//!
//! Based on the Serial Flasher Protocol Specification version 1. Only the
//! SPI subset is implemented; the numbering follows the established serprog
//! command set so flashrom and friends can talk to us unmodified.

use bitflags::bitflags;

/// Protocol version we implement
pub const SERPROG_PROTOCOL_VERSION: u16 = 1;

/// ACK response byte
pub const S_ACK: u8 = 0x06;
/// NAK response byte
pub const S_NAK: u8 = 0x15;

/// Legacy liveness byte: some host tools send a bare JEDEC RDID opcode to see
/// whether anything is listening. It is ACKed and otherwise ignored.
pub const LEGACY_RDID: u8 = 0x9F;

/// Number of bytes in the command map bitmap
pub const CMDMAP_SIZE: usize = 32;

/// Length of the programmer name field
pub const PGMNAME_SIZE: usize = 16;

/// Largest length an O_SPIOP length field can carry (24 bits)
pub const MAX_SPIOP_LEN: u32 = (1 << 24) - 1;

/// Serprog commands understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// No operation
    Nop = 0x00,
    /// Query interface version
    QueryIface = 0x01,
    /// Query supported commands bitmap
    QueryCmdMap = 0x02,
    /// Query programmer name
    QueryPgmName = 0x03,
    /// Query serial buffer size
    QuerySerBuf = 0x04,
    /// Query supported bustypes
    QueryBusType = 0x05,
    /// No-operation answered with NAK+ACK, used to resynchronize
    SyncNop = 0x10,
    /// Set used bustype(s)
    SetBusType = 0x12,
    /// Perform SPI operation
    SpiOp = 0x13,
    /// Set SPI clock frequency
    SetSpiFreq = 0x14,
    /// Enable/disable output drivers
    SetPinState = 0x15,
}

impl Command {
    /// Every command the engine implements, in opcode order
    pub const ALL: [Command; 11] = [
        Command::Nop,
        Command::QueryIface,
        Command::QueryCmdMap,
        Command::QueryPgmName,
        Command::QuerySerBuf,
        Command::QueryBusType,
        Command::SyncNop,
        Command::SetBusType,
        Command::SpiOp,
        Command::SetSpiFreq,
        Command::SetPinState,
    ];

    /// Wire opcode of this command
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Decode an opcode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Command::Nop),
            0x01 => Some(Command::QueryIface),
            0x02 => Some(Command::QueryCmdMap),
            0x03 => Some(Command::QueryPgmName),
            0x04 => Some(Command::QuerySerBuf),
            0x05 => Some(Command::QueryBusType),
            0x10 => Some(Command::SyncNop),
            0x12 => Some(Command::SetBusType),
            0x13 => Some(Command::SpiOp),
            0x14 => Some(Command::SetSpiFreq),
            0x15 => Some(Command::SetPinState),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> core::result::Result<Self, u8> {
        Command::from_byte(byte).ok_or(byte)
    }
}

bitflags! {
    /// Bus type flags used by Q_BUSTYPE and S_BUSTYPE
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BusType: u8 {
        /// Parallel bus
        const PARALLEL = 1 << 0;
        /// LPC bus
        const LPC      = 1 << 1;
        /// FWH bus
        const FWH      = 1 << 2;
        /// SPI bus
        const SPI      = 1 << 3;
    }
}

/// Supported commands bitmap
///
/// Bit `n % 8` of byte `n / 8` is set iff command `n` is implemented. Read
/// as eight little-endian 32-bit words this is the classic serprog layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMap {
    bitmap: [u8; CMDMAP_SIZE],
}

impl CommandMap {
    /// Create an empty command map
    pub const fn new() -> Self {
        Self {
            bitmap: [0; CMDMAP_SIZE],
        }
    }

    /// Build a map from a list of commands
    pub const fn from_commands(commands: &[Command]) -> Self {
        let mut map = Self::new();
        let mut i = 0;
        while i < commands.len() {
            map = map.with(commands[i].opcode());
            i += 1;
        }
        map
    }

    /// Return a copy with `cmd` marked as supported
    pub const fn with(mut self, cmd: u8) -> Self {
        self.bitmap[(cmd / 8) as usize] |= 1 << (cmd % 8);
        self
    }

    /// Check if a command is supported
    pub const fn is_supported(&self, cmd: u8) -> bool {
        self.bitmap[(cmd / 8) as usize] & (1 << (cmd % 8)) != 0
    }

    /// Raw bitmap as sent over the wire
    pub const fn as_bytes(&self) -> &[u8; CMDMAP_SIZE] {
        &self.bitmap
    }
}

impl Default for CommandMap {
    fn default() -> Self {
        Self::new()
    }
}

/// The command map advertised by the engine
pub const SUPPORTED_COMMANDS: CommandMap = CommandMap::from_commands(&Command::ALL);

/// Pack a programmer name into the fixed, NUL-padded wire field
///
/// Names longer than 16 bytes are truncated.
pub fn pgmname_field(name: &str) -> [u8; PGMNAME_SIZE] {
    let mut field = [0u8; PGMNAME_SIZE];
    let len = core::cmp::min(name.len(), PGMNAME_SIZE);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// Decode a 24-bit little-endian length field
pub fn u24_from_le(bytes: [u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}
