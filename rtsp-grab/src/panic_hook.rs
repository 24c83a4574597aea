//! Panic reporting through `tracing`.
//!
//! Release builds abort on panic, so the hook is the only place a panic in
//! the capture or retention task leaves a trace in the service log before
//! systemd restarts the process.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, PanicHookInfo};
use std::thread;

/// Log every panic as a structured error event, then run the previous hook.
pub fn install() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        // A panic inside the subscriber must not turn into a double panic.
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| report(info)));
        previous(info);
    }));
}

fn report(info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let current = thread::current();
    let thread_name = current.name().unwrap_or("unnamed");

    tracing::error!(
        target: "rtsp_grab::panic",
        kind = "Panic",
        thread = thread_name,
        location = %location,
        payload = %payload_message(info.payload()),
        "Process panicked"
    );

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        tracing::error!(target: "rtsp_grab::panic", "Backtrace:\n{backtrace}");
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}
