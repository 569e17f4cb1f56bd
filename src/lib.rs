//! # CncSerialStream
//!
//! Interrupt-driven UART transport for a CNC motion controller.
//!
//! ## Architecture
//!
//! Every received byte takes one of two paths inside the UART interrupt:
//! - Real-time commands (feed hold, status report, reset) are classified and
//!   dispatched immediately, bypassing the input queue
//! - Everything else lands in a lock-free SPSC ring drained by the protocol
//!   task through a [`SerialStream`]
//!
//! The interrupt path never blocks and never allocates. Its diagnostics go
//! to [`RT_LOG_STREAM`], which the foreground forwards to the `log` facade
//! via [`log_drain::forward_to_log`].

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod hal;
pub mod log_drain;
pub mod log_globals;
pub mod logging;
pub mod realtime;
pub mod ring_buffer;
pub mod serial;
pub mod stats;

pub use error::{SerialError, StoreError};
pub use log_globals::RT_LOG_STREAM;
pub use realtime::{HandlerOverride, RealtimeRedirect, REALTIME};
pub use ring_buffer::RxBuffer;
pub use serial::{SerialPort, SerialRegistry, SerialStream, StreamFlags, StreamProperties};
pub use stats::LineSnapshot;

/// Firmware version string.
pub const VERSION: &str = env!("VERSION_STRING");
