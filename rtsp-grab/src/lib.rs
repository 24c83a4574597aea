//! Scheduled RTSP capture.
//!
//! A [`supervisor::Supervisor`] records a camera into segments aligned to
//! wall-clock boundaries, reconnecting with a bounded retry budget, while a
//! [`retention::RetentionService`] expires old recordings in the background.

pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod panic_hook;
pub mod retention;
pub mod schedule;
pub mod supervisor;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use error::{Error, Result};
