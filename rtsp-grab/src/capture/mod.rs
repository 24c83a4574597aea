//! Connecting to the source and writing segments.

mod connector;
mod error;
mod layout;
mod retry;
pub mod sink;
mod writer;

pub use connector::{Connector, FfmpegConnector, PacketResult, PacketStream};
pub use error::{ConnectError, FatalCaptureError, StreamError};
pub use layout::SegmentLayout;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use sink::{FfmpegMuxSink, SegmentSink, TsFileSink};
pub use writer::{EndReason, SegmentResult, SegmentWriter};
