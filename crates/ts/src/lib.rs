//! MPEG transport stream helpers for stream-copy recording.
//!
//! This crate provides the packet-level plumbing between a demuxing ingest
//! process and a segment writer:
//! - [`TsPacketCodec`] frames an arbitrary byte stream into 188-byte packets,
//!   resynchronising on the sync byte after garbage.
//! - [`psi`] parses the Program Association and Program Map tables.
//! - [`TrackFilter`] drops the elementary streams of a media kind and rewrites
//!   the PMT so downstream muxers never see the dropped tracks.

pub mod codec;
pub mod error;
pub mod filter;
pub mod packet;
pub mod psi;

pub use codec::TsPacketCodec;
pub use error::TsError;
pub use filter::{TrackFilter, TrackSelection};
pub use packet::{PACKET_SIZE, PID_NULL, PID_PAT, SYNC_BYTE, TsPacket};
pub use psi::{PatEntry, PmtSection, PmtStream, StreamKind, mpeg2_crc32};

/// Result type for TS operations
pub type Result<T> = std::result::Result<T, TsError>;
