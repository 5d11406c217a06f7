//! Delivery and report sinks
//!
//! Contains LogAlertDispatcher, LogReportSink and FileReportSink.

mod file;
mod log;

pub use self::file::FileReportSink;
pub use self::log::{LogAlertDispatcher, LogReportSink};
