use crate::{Result, TsError};
use bytes::Bytes;

/// Size of a transport stream packet in bytes.
pub const PACKET_SIZE: usize = 188;

/// Sync byte that starts every packet.
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// A single 188-byte transport stream packet.
///
/// The packet keeps its raw bytes so it can be written out unchanged; header
/// fields are decoded on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacket {
    data: Bytes,
}

impl TsPacket {
    /// Wrap 188 bytes starting with the sync byte.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() != PACKET_SIZE {
            return Err(TsError::InvalidPacketSize(data.len()));
        }
        if data[0] != SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(data[0]));
        }
        Ok(Self { data })
    }

    /// Packet identifier.
    pub fn pid(&self) -> u16 {
        ((self.data[1] as u16 & 0x1F) << 8) | self.data[2] as u16
    }

    /// Payload Unit Start Indicator
    pub fn payload_unit_start(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    fn adaptation_field_control(&self) -> u8 {
        (self.data[3] >> 4) & 0x03
    }

    /// Check if this packet has a payload
    pub fn has_payload(&self) -> bool {
        matches!(self.adaptation_field_control(), 0x01 | 0x03)
    }

    /// Offset of the payload within the packet, if any.
    fn payload_offset(&self) -> Option<usize> {
        if !self.has_payload() {
            return None;
        }
        let offset = match self.adaptation_field_control() {
            0x03 => 5 + self.data[4] as usize,
            _ => 4,
        };
        (offset < PACKET_SIZE).then_some(offset)
    }

    /// Payload bytes (after the adaptation field).
    pub fn payload(&self) -> Option<Bytes> {
        self.payload_offset().map(|offset| self.data.slice(offset..))
    }

    /// PSI section bytes of a packet that starts a section (pointer field skipped).
    pub fn psi_section_start(&self) -> Option<Bytes> {
        if !self.payload_unit_start() {
            return None;
        }
        let payload = self.payload()?;
        let pointer = *payload.first()? as usize;
        (1 + pointer < payload.len()).then(|| payload.slice(1 + pointer..))
    }

    /// Build a packet carrying a single PSI section, reusing this packet's header.
    ///
    /// Returns `None` when the section does not fit into one packet.
    pub fn with_psi_section(&self, section: &[u8]) -> Option<Self> {
        // header + pointer field
        if 4 + 1 + section.len() > PACKET_SIZE {
            return None;
        }
        let mut data = Vec::with_capacity(PACKET_SIZE);
        data.push(SYNC_BYTE);
        data.push(0x40 | (self.data[1] & 0x1F));
        data.push(self.data[2]);
        // payload only, keep the continuity counter
        data.push(0x10 | self.continuity_counter());
        data.push(0x00);
        data.extend_from_slice(section);
        data.resize(PACKET_SIZE, 0xFF);
        Some(Self { data: data.into() })
    }

    /// Raw packet bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
