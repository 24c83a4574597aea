//! Test doubles for the capture pipeline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::time::Instant;
use ts::{PACKET_SIZE, SYNC_BYTE, TsPacket};

use crate::capture::{ConnectError, Connector, PacketStream};

/// Initialize tracing for tests.
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A payload-only packet on `pid`.
pub fn packet(pid: u16) -> TsPacket {
    let mut data = vec![0u8; PACKET_SIZE];
    data[0] = SYNC_BYTE;
    data[1] = (pid >> 8) as u8 & 0x1F;
    data[2] = pid as u8;
    data[3] = 0x10;
    TsPacket::parse(data.into()).expect("well-formed packet")
}

/// Endless stream producing one packet every `every`.
pub fn live_stream(every: Duration) -> PacketStream {
    PacketStream::new(stream::repeat(()).then(move |_| async move {
        tokio::time::sleep(every).await;
        Ok(packet(0x100))
    }))
}

/// `count` packets, one every `every`, then end of stream.
pub fn finite_stream(count: usize, every: Duration) -> PacketStream {
    PacketStream::new(stream::iter(0..count).then(move |_| async move {
        tokio::time::sleep(every).await;
        Ok(packet(0x100))
    }))
}

/// Connector driven by a closure receiving the 1-based attempt number.
pub struct FnConnector<F> {
    make: F,
    attempts: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
}

impl<F> FnConnector<F>
where
    F: Fn(u32) -> Result<PacketStream, ConnectError> + Send + Sync,
{
    pub fn new(make: F) -> Self {
        Self {
            make,
            attempts: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// When each `connect` call started.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().clone()
    }
}

#[async_trait]
impl<F> Connector for FnConnector<F>
where
    F: Fn(u32) -> Result<PacketStream, ConnectError> + Send + Sync,
{
    async fn connect(&self) -> Result<PacketStream, ConnectError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.connect_times.lock().push(Instant::now());
        (self.make)(attempt)
    }

    fn source(&self) -> String {
        "rtsp://test/stream".to_string()
    }
}

/// A connect error as produced by an unreachable camera.
pub fn unreachable_source() -> ConnectError {
    ConnectError::Timeout {
        url: "rtsp://test/stream".to_string(),
        timeout: Duration::from_secs(15),
    }
}
