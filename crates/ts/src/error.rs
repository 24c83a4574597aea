use thiserror::Error;

/// Errors raised while framing or parsing transport stream data.
#[derive(Debug, Error)]
pub enum TsError {
    #[error("invalid packet size: {0} (expected 188)")]
    InvalidPacketSize(usize),

    #[error("invalid sync byte: 0x{0:02X}")]
    InvalidSyncByte(u8),

    #[error("insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("invalid table id: expected 0x{expected:02X}, got 0x{actual:02X}")]
    InvalidTableId { expected: u8, actual: u8 },

    #[error("invalid section length: {0}")]
    InvalidSectionLength(u16),

    #[error("CRC-32 mismatch: stored 0x{expected:08X}, calculated 0x{calculated:08X}")]
    Crc32Mismatch { expected: u32, calculated: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
