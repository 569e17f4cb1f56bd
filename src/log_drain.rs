//! Foreground drain of interrupt-context log entries.
//!
//! Moves entries from a [`LogStream`] into the `log` facade (EspLogger on
//! target, which prints on the console UART). Call it from the protocol
//! loop; it never runs in interrupt context.

use crate::logging::{BufWriter, LogEntry, LogStream, NO_PORT};

/// `log` target used for forwarded entries.
pub const ISR_LOG_TARGET: &str = "serial::isr";

/// Format log entry to bytes.
///
/// Format: `[timestamp_us] LEVEL uartN: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    let mut writer = BufWriter { buf, pos: 0 };

    let _ = if entry.port == NO_PORT {
        writeln!(
            writer,
            "[{:10}] {}: {}",
            entry.timestamp_us,
            entry.level.as_str(),
            entry.message()
        )
    } else {
        writeln!(
            writer,
            "[{:10}] {} uart{}: {}",
            entry.timestamp_us,
            entry.level.as_str(),
            entry.port,
            entry.message()
        )
    };

    writer.pos
}

/// Forward every pending entry to the `log` facade.
///
/// Also reports and resets the dropped counter. Returns the number of
/// entries forwarded.
pub fn forward_to_log<const N: usize>(stream: &LogStream<N>) -> usize {
    let mut forwarded = 0;

    while let Some(entry) = stream.drain() {
        let level = log::Level::from(entry.level);
        if entry.port == NO_PORT {
            log::log!(target: ISR_LOG_TARGET, level, "[{}] {}", entry.timestamp_us, entry.message());
        } else {
            log::log!(
                target: ISR_LOG_TARGET,
                level,
                "[{}] uart{}: {}",
                entry.timestamp_us,
                entry.port,
                entry.message()
            );
        }
        forwarded += 1;
    }

    let dropped = stream.dropped();
    if dropped > 0 {
        log::warn!(target: ISR_LOG_TARGET, "dropped {} interrupt log entries", dropped);
        stream.reset_dropped();
    }

    forwarded
}
