//! Per-track packet filtering.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::packet::{PID_NULL, PID_PAT, TsPacket};
use crate::psi::{PmtSection, StreamKind, parse_pat};

/// Which media kinds to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSelection {
    pub video: bool,
    pub audio: bool,
}

impl TrackSelection {
    pub const ALL: Self = Self {
        video: true,
        audio: true,
    };

    fn keeps(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Video => self.video,
            StreamKind::Audio => self.audio,
            StreamKind::Other => true,
        }
    }

    /// `true` when nothing has to be dropped.
    pub fn is_passthrough(&self) -> bool {
        self.video && self.audio
    }
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self::ALL
    }
}

/// Drops the packets of deselected elementary streams.
///
/// The filter learns the PMT PIDs from the PAT and the elementary stream PIDs
/// from each PMT. PMTs are rewritten without the dropped streams when the
/// section fits in one packet; otherwise they pass through unchanged.
/// Packets on PIDs not yet described by a PMT are forwarded.
#[derive(Debug)]
pub struct TrackFilter {
    selection: TrackSelection,
    pmt_pids: HashSet<u16>,
    stream_kinds: HashMap<u16, StreamKind>,
    dropped_packets: u64,
    warned_multi_packet_pmt: bool,
    warned_private_data: bool,
}

impl TrackFilter {
    pub fn new(selection: TrackSelection) -> Self {
        Self {
            selection,
            pmt_pids: HashSet::new(),
            stream_kinds: HashMap::new(),
            dropped_packets: 0,
            warned_multi_packet_pmt: false,
            warned_private_data: false,
        }
    }

    pub fn selection(&self) -> TrackSelection {
        self.selection
    }

    /// Packets discarded so far.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    /// `true` once a PMT listed private data that carries no audio
    /// descriptor while audio is kept.
    pub fn saw_unidentified_private_data(&self) -> bool {
        self.warned_private_data
    }

    /// Filter a single packet. Returns the packet to write, if any.
    pub fn filter(&mut self, packet: TsPacket) -> Option<TsPacket> {
        let pid = packet.pid();
        if pid == PID_NULL {
            return Some(packet);
        }
        if pid == PID_PAT {
            self.learn_pat(&packet);
            return Some(packet);
        }
        if self.pmt_pids.contains(&pid) {
            return Some(self.rewrite_pmt(packet));
        }
        if self.selection.is_passthrough() {
            return Some(packet);
        }

        match self.stream_kinds.get(&pid) {
            Some(kind) if !self.selection.keeps(*kind) => {
                self.dropped_packets += 1;
                None
            }
            _ => Some(packet),
        }
    }

    fn learn_pat(&mut self, packet: &TsPacket) {
        let Some(section) = packet.psi_section_start() else {
            return;
        };
        match parse_pat(&section) {
            Ok(entries) => {
                for entry in entries {
                    if self.pmt_pids.insert(entry.pmt_pid) {
                        debug!(
                            program = entry.program_number,
                            pmt_pid = entry.pmt_pid,
                            "Discovered PMT PID"
                        );
                    }
                }
            }
            Err(e) => debug!(error = %e, "Ignoring unparsable PAT"),
        }
    }

    fn rewrite_pmt(&mut self, packet: TsPacket) -> TsPacket {
        let Some(section) = packet.psi_section_start() else {
            return packet;
        };
        let pmt = match PmtSection::parse(&section) {
            Ok(pmt) => pmt,
            Err(e) => {
                if !self.warned_multi_packet_pmt {
                    warn!(error = %e, "PMT not contained in one packet, forwarding unchanged");
                    self.warned_multi_packet_pmt = true;
                }
                return packet;
            }
        };

        for stream in &pmt.streams {
            let kind = stream.kind();
            self.stream_kinds.insert(stream.elementary_pid, kind);
            if self.selection.audio
                && stream.is_private_data()
                && kind == StreamKind::Other
                && !self.warned_private_data
            {
                warn!(
                    pid = stream.elementary_pid,
                    "Private data stream without an audio descriptor, \
                     audio it carries (e.g. G.711) may not survive remuxing"
                );
                self.warned_private_data = true;
            }
        }

        if self.selection.is_passthrough() {
            return packet;
        }
        let selection = self.selection;
        let rewritten = pmt.to_bytes_with(|s| selection.keeps(s.kind()));
        packet.with_psi_section(&rewritten).unwrap_or(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PACKET_SIZE, SYNC_BYTE};
    use crate::psi::STREAM_TYPE_PRIVATE_DATA;
    use crate::psi::tests::{pat_section, pmt_section, pmt_section_with_descriptors};

    fn psi_packet(pid: u16, section: &[u8]) -> TsPacket {
        let mut data = vec![0xFFu8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = 0x40 | ((pid >> 8) as u8 & 0x1F);
        data[2] = pid as u8;
        data[3] = 0x10;
        data[4] = 0x00;
        data[5..5 + section.len()].copy_from_slice(section);
        TsPacket::parse(data.into()).unwrap()
    }

    fn es_packet(pid: u16) -> TsPacket {
        let mut data = vec![0u8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = (pid >> 8) as u8 & 0x1F;
        data[2] = pid as u8;
        data[3] = 0x10;
        TsPacket::parse(data.into()).unwrap()
    }

    fn run(filter: &mut TrackFilter) -> Vec<u16> {
        let packets = vec![
            psi_packet(PID_PAT, &pat_section(1, 0x1000)),
            psi_packet(0x1000, &pmt_section(&[(0x1B, 0x100), (0x0F, 0x101)])),
            es_packet(0x100),
            es_packet(0x101),
            es_packet(0x100),
            es_packet(0x101),
        ];
        packets
            .into_iter()
            .filter_map(|p| filter.filter(p))
            .map(|p| p.pid())
            .collect()
    }

    #[test]
    fn test_passthrough_keeps_everything() {
        let mut filter = TrackFilter::new(TrackSelection::ALL);
        assert_eq!(run(&mut filter).len(), 6);
        assert_eq!(filter.dropped_packets(), 0);
    }

    #[test]
    fn test_drop_audio() {
        let mut filter = TrackFilter::new(TrackSelection {
            video: true,
            audio: false,
        });
        assert_eq!(run(&mut filter), vec![PID_PAT, 0x1000, 0x100, 0x100]);
        assert_eq!(filter.dropped_packets(), 2);
    }

    #[test]
    fn test_drop_video() {
        let mut filter = TrackFilter::new(TrackSelection {
            video: false,
            audio: true,
        });
        assert_eq!(run(&mut filter), vec![PID_PAT, 0x1000, 0x101, 0x101]);
    }

    #[test]
    fn test_pmt_is_rewritten_without_dropped_stream() {
        let mut filter = TrackFilter::new(TrackSelection {
            video: true,
            audio: false,
        });
        filter.filter(psi_packet(PID_PAT, &pat_section(1, 0x1000)));
        let pmt_packet = filter
            .filter(psi_packet(
                0x1000,
                &pmt_section(&[(0x1B, 0x100), (0x0F, 0x101)]),
            ))
            .unwrap();

        let section = pmt_packet.psi_section_start().unwrap();
        let pmt = PmtSection::parse(&section).unwrap();
        assert_eq!(pmt.streams.len(), 1);
        assert_eq!(pmt.streams[0].elementary_pid, 0x100);
    }

    /// PAT, then a PMT with H.264 on 0x100, Opus-registered private data on
    /// 0x101 and descriptor-less private data on 0x102, then one packet each.
    fn run_private(filter: &mut TrackFilter) -> Vec<u16> {
        let opus: &[u8] = &[0x05, 0x04, b'O', b'p', b'u', b's'];
        let pmt = pmt_section_with_descriptors(&[
            (0x1B, 0x100, &[][..]),
            (STREAM_TYPE_PRIVATE_DATA, 0x101, opus),
            (STREAM_TYPE_PRIVATE_DATA, 0x102, &[][..]),
        ]);
        [
            psi_packet(PID_PAT, &pat_section(1, 0x1000)),
            psi_packet(0x1000, &pmt),
            es_packet(0x100),
            es_packet(0x101),
            es_packet(0x102),
        ]
        .into_iter()
        .filter_map(|p| filter.filter(p))
        .map(|p| p.pid())
        .collect()
    }

    #[test]
    fn test_private_data_audio_follows_audio_selection() {
        let mut filter = TrackFilter::new(TrackSelection {
            video: true,
            audio: false,
        });
        assert_eq!(run_private(&mut filter), vec![PID_PAT, 0x1000, 0x100, 0x102]);
        assert_eq!(filter.dropped_packets(), 1);
        assert!(!filter.saw_unidentified_private_data());
    }

    #[test]
    fn test_unidentified_private_data_flagged_when_audio_kept() {
        let mut filter = TrackFilter::new(TrackSelection::ALL);
        assert_eq!(run_private(&mut filter).len(), 5);
        assert!(filter.saw_unidentified_private_data());

        let mut filter = TrackFilter::new(TrackSelection {
            video: false,
            audio: true,
        });
        assert_eq!(run_private(&mut filter), vec![PID_PAT, 0x1000, 0x101, 0x102]);
        assert!(filter.saw_unidentified_private_data());
    }

    #[test]
    fn test_unknown_pids_forwarded_before_pmt() {
        let mut filter = TrackFilter::new(TrackSelection {
            video: true,
            audio: false,
        });
        assert!(filter.filter(es_packet(0x101)).is_some());
    }
}
