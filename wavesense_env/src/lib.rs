//! WaveSense Environment Abstraction Layer
//!
//! This crate provides the capability seams between the radar pipeline and
//! whatever hosts it (device firmware task, integration test, simulator).
//! The core never touches hardware or wall-clock time directly; everything
//! non-deterministic is injected:
//!
//! - Time: [`Clock`] (monotonic milliseconds + microseconds)
//! - Input: [`ByteSource`] (opaque UART byte stream)
//! - Output: [`EventSink`] (publisher boundary for frames and events)
//!
//! By routing all of these through traits, any pipeline run becomes
//! reproducible: the simulator drives a [`ManualClock`] and a scripted
//! byte source, and a bug reproduces from the same script every time.

mod context;
mod error;
mod sink;
mod source;

pub use context::{Clock, ManualClock, SystemClock};
pub use error::EnvError;
pub use sink::{EventSink, RecordingSink};
pub use source::{ByteSource, ReplaySource};
