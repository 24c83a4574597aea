//! Framing of a raw byte stream into transport stream packets.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::packet::{PACKET_SIZE, SYNC_BYTE, TsPacket};
use crate::TsError;

/// Decoder that splits a byte stream into 188-byte [`TsPacket`]s.
///
/// When the stream loses alignment the decoder scans forward for a sync byte
/// that is followed by another one a packet later, discarding the bytes in
/// between.
#[derive(Debug, Default)]
pub struct TsPacketCodec {
    discarded: u64,
}

impl TsPacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes dropped while resynchronising.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Find the next plausible packet start in `buf`.
    fn find_sync(buf: &[u8]) -> Option<usize> {
        let mut from = 0;
        while let Some(pos) = memchr::memchr(SYNC_BYTE, &buf[from..]) {
            let candidate = from + pos;
            let next = candidate + PACKET_SIZE;
            // Accept when the following packet also starts with a sync byte,
            // or when not enough data has arrived yet to tell.
            if next >= buf.len() || buf[next] == SYNC_BYTE {
                return Some(candidate);
            }
            from = candidate + 1;
        }
        None
    }
}

impl Decoder for TsPacketCodec {
    type Item = TsPacket;
    type Error = TsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] != SYNC_BYTE {
            let skip = Self::find_sync(src).unwrap_or(src.len());
            warn!(skipped = skip, "Transport stream out of sync, resynchronising");
            src.advance(skip);
            self.discarded += skip as u64;
        }

        if src.len() < PACKET_SIZE {
            src.reserve(PACKET_SIZE * 16);
            return Ok(None);
        }

        let data = src.split_to(PACKET_SIZE).freeze();
        TsPacket::parse(data).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Dropping truncated trailing packet");
                    self.discarded += buf.len() as u64;
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn packet_bytes(pid: u16) -> Vec<u8> {
        let mut data = vec![0u8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = (pid >> 8) as u8 & 0x1F;
        data[2] = pid as u8;
        data[3] = 0x10;
        data
    }

    #[test]
    fn test_decode_waits_for_full_packet() {
        let mut codec = TsPacketCodec::new();
        let mut buf = BytesMut::from(&packet_bytes(0x100)[..100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&packet_bytes(0x100)[100..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.pid(), 0x100);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_resyncs_after_garbage() {
        let mut codec = TsPacketCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x00, 0x47, 0x12, 0x34]);
        buf.extend_from_slice(&packet_bytes(0x101));
        buf.extend_from_slice(&packet_bytes(0x102));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.pid(), 0x101);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.pid(), 0x102);
        assert_eq!(codec.discarded_bytes(), 4);
    }

    #[tokio::test]
    async fn test_framed_read_drops_trailing_partial_packet() {
        let mut input = packet_bytes(0x100);
        input.extend_from_slice(&packet_bytes(0x101));
        input.extend_from_slice(&[SYNC_BYTE, 0x00, 0x00]);

        let mut framed = FramedRead::new(&input[..], TsPacketCodec::new());
        let mut pids = Vec::new();
        while let Some(packet) = framed.next().await {
            pids.push(packet.unwrap().pid());
        }
        assert_eq!(pids, vec![0x100, 0x101]);
        assert_eq!(framed.decoder().discarded_bytes(), 3);
    }
}
