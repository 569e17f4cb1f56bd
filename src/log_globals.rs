//! Global log stream instance.

use crate::logging::LogStream;

/// Log stream shared by all UART interrupt handlers.
///
/// Multiple producers (one ISR per UART, possibly nested), single consumer
/// (foreground drain, see [`crate::log_drain`]).
pub static RT_LOG_STREAM: LogStream = LogStream::new();
