//! Program Specific Information: PAT and PMT sections.

use crate::{Result, TsError};

/// Table id of the Program Association Table.
pub const TABLE_ID_PAT: u8 = 0x00;

/// Table id of the Program Map Table.
pub const TABLE_ID_PMT: u8 = 0x02;

/// MPEG-2 CRC-32 lookup table (polynomial 0x04C11DB7, no reflection).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Compute the MPEG-2 CRC-32 used by PSI sections.
pub fn mpeg2_crc32(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
        (crc << 8) ^ CRC32_TABLE[((crc >> 24) ^ byte as u32) as usize]
    })
}

/// PMT `stream_type` of PES private data, also used for DVB-style audio.
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;

/// ES descriptor tags that mark private data as audio: AC-3, E-AC-3, DTS
/// and AAC in their DVB form.
const AUDIO_DESCRIPTOR_TAGS: [u8; 4] = [0x6A, 0x7A, 0x7B, 0x7C];

/// Registration descriptor tag (ISO/IEC 13818-1).
const REGISTRATION_DESCRIPTOR_TAG: u8 = 0x05;

/// Registration format identifiers of audio codecs carried as private data.
const AUDIO_FORMAT_IDS: [&[u8; 4]; 7] = [b"AC-3", b"EAC3", b"DTS1", b"DTS2", b"DTS3", b"Opus", b"BSSD"];

/// Broad media kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

impl StreamKind {
    /// Classify a PMT `stream_type`.
    pub fn from_stream_type(stream_type: u8) -> Self {
        match stream_type {
            // MPEG-1/2 video, MPEG-4 part 2, H.264, H.265, AVS/AV1 private
            0x01 | 0x02 | 0x10 | 0x1B | 0x20 | 0x24 | 0x42 | 0xD1 | 0xEA => Self::Video,
            // MPEG audio, AAC (ADTS/LATM), AC-3/E-AC-3 (ATSC), DTS, LPCM
            0x03 | 0x04 | 0x0F | 0x11 | 0x1C | 0x80 | 0x81 | 0x82 | 0x83 | 0x84 | 0x87 => {
                Self::Audio
            }
            _ => Self::Other,
        }
    }
}

/// Validate the common section header and return the total section size
/// (`3 + section_length`), checking the trailing CRC.
fn checked_section_len(section: &[u8], table_id: u8, min_length: u16) -> Result<usize> {
    if section.len() < 3 {
        return Err(TsError::InsufficientData {
            expected: 3,
            actual: section.len(),
        });
    }
    if section[0] != table_id {
        return Err(TsError::InvalidTableId {
            expected: table_id,
            actual: section[0],
        });
    }
    let section_length = ((section[1] as u16 & 0x0F) << 8) | section[2] as u16;
    if section_length < min_length {
        return Err(TsError::InvalidSectionLength(section_length));
    }
    let total = 3 + section_length as usize;
    if section.len() < total {
        return Err(TsError::InsufficientData {
            expected: total,
            actual: section.len(),
        });
    }
    let calculated = mpeg2_crc32(&section[..total - 4]);
    let stored = u32::from_be_bytes([
        section[total - 4],
        section[total - 3],
        section[total - 2],
        section[total - 1],
    ]);
    if calculated != stored {
        return Err(TsError::Crc32Mismatch {
            expected: stored,
            calculated,
        });
    }
    Ok(total)
}

/// A program entry of the PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Parse the program list of a PAT section. The network PID entry
/// (program 0) is skipped.
pub fn parse_pat(section: &[u8]) -> Result<Vec<PatEntry>> {
    let total = checked_section_len(section, TABLE_ID_PAT, 9)?;
    Ok(section[8..total - 4]
        .chunks_exact(4)
        .map(|entry| PatEntry {
            program_number: u16::from_be_bytes([entry[0], entry[1]]),
            pmt_pid: ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16,
        })
        .filter(|entry| entry.program_number != 0)
        .collect())
}

/// Elementary stream entry of a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// Raw entry bytes (5-byte header plus ES descriptors).
    raw: Vec<u8>,
}

impl PmtStream {
    /// Media kind from the stream type, refined by the ES descriptors for
    /// private data.
    pub fn kind(&self) -> StreamKind {
        if self.is_private_data() && self.has_audio_descriptor() {
            return StreamKind::Audio;
        }
        StreamKind::from_stream_type(self.stream_type)
    }

    pub fn is_private_data(&self) -> bool {
        self.stream_type == STREAM_TYPE_PRIVATE_DATA
    }

    /// `(tag, payload)` of each ES descriptor. A truncated trailing
    /// descriptor is ignored.
    pub fn descriptors(&self) -> impl Iterator<Item = (u8, &[u8])> {
        let mut rest = self.raw.get(5..).unwrap_or_default();
        std::iter::from_fn(move || {
            let [tag, len, tail @ ..] = rest else {
                return None;
            };
            let payload = tail.get(..*len as usize)?;
            let item = (*tag, payload);
            rest = &tail[*len as usize..];
            Some(item)
        })
    }

    fn has_audio_descriptor(&self) -> bool {
        self.descriptors().any(|(tag, payload)| {
            AUDIO_DESCRIPTOR_TAGS.contains(&tag)
                || (tag == REGISTRATION_DESCRIPTOR_TAG
                    && payload
                        .get(..4)
                        .is_some_and(|id| AUDIO_FORMAT_IDS.iter().any(|f| f.as_slice() == id)))
        })
    }
}

/// A parsed PMT section that can be re-serialised with a subset of streams.
#[derive(Debug, Clone)]
pub struct PmtSection {
    /// Bytes from table id through program info descriptors.
    head: Vec<u8>,
    pub streams: Vec<PmtStream>,
}

impl PmtSection {
    pub fn parse(section: &[u8]) -> Result<Self> {
        let total = checked_section_len(section, TABLE_ID_PMT, 13)?;
        let program_info_length = (((section[10] as usize) & 0x0F) << 8) | section[11] as usize;
        let streams_start = 12 + program_info_length;
        let streams_end = total - 4;
        if streams_start > streams_end {
            return Err(TsError::InvalidSectionLength((total - 3) as u16));
        }

        let mut streams = Vec::new();
        let mut pos = streams_start;
        while pos + 5 <= streams_end {
            let es_info_length =
                (((section[pos + 3] as usize) & 0x0F) << 8) | section[pos + 4] as usize;
            let end = pos + 5 + es_info_length;
            if end > streams_end {
                return Err(TsError::InsufficientData {
                    expected: end,
                    actual: streams_end,
                });
            }
            streams.push(PmtStream {
                stream_type: section[pos],
                elementary_pid: ((section[pos + 1] as u16 & 0x1F) << 8) | section[pos + 2] as u16,
                raw: section[pos..end].to_vec(),
            });
            pos = end;
        }

        Ok(Self {
            head: section[..streams_start].to_vec(),
            streams,
        })
    }

    /// Serialise the section, keeping only streams accepted by `keep`.
    /// Section length and CRC are recomputed.
    pub fn to_bytes_with(&self, mut keep: impl FnMut(&PmtStream) -> bool) -> Vec<u8> {
        let mut out = self.head.clone();
        for stream in self.streams.iter().filter(|s| keep(s)) {
            out.extend_from_slice(&stream.raw);
        }
        let section_length = (out.len() - 3 + 4) as u16;
        out[1] = (out[1] & 0xF0) | ((section_length >> 8) as u8 & 0x0F);
        out[2] = section_length as u8;
        let crc = mpeg2_crc32(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }
}
