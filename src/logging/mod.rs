//! Two independent append-only streams: the operational log (via `tracing`) and the
//!  measurement data log. Both are time-rotated by [rotating_writer::RotatingFileWriter].

pub mod compression;
pub mod measurement_log;
pub mod operational;
pub mod rotating_writer;
