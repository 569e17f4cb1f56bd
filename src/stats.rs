//! Per-port receive statistics.
//!
//! Interrupt context never reports failure upward. Everything it wants the
//! foreground to know ends up here, or in the ring's sticky overflow flag.

use core::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe line statistics.
///
/// Counters only ever grow; the foreground takes a [`LineSnapshot`] when it
/// wants to report.
pub struct LineStats {
    /// Bytes dropped because the receive ring was full.
    overflowed: AtomicU32,

    /// Hardware RX FIFO overruns (bytes lost before the ISR ran).
    fifo_overruns: AtomicU32,

    /// Framing or parity errors.
    line_errors: AtomicU32,

    /// Bytes consumed by the real-time handler.
    diverted: AtomicU32,

    /// Bytes refused while input was suspended.
    refused: AtomicU32,
}

impl LineStats {
    /// Create zeroed statistics.
    pub const fn new() -> Self {
        Self {
            overflowed: AtomicU32::new(0),
            fifo_overruns: AtomicU32::new(0),
            line_errors: AtomicU32::new(0),
            diverted: AtomicU32::new(0),
            refused: AtomicU32::new(0),
        }
    }

    #[inline]
    pub(crate) fn note_overflow(&self) -> u32 {
        self.overflowed.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub(crate) fn note_fifo_overrun(&self) {
        self.fifo_overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn note_line_error(&self) {
        self.line_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn note_diverted(&self) {
        self.diverted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn note_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the counters.
    #[inline]
    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            overflowed: self.overflowed.load(Ordering::Relaxed),
            fifo_overruns: self.fifo_overruns.load(Ordering::Relaxed),
            line_errors: self.line_errors.load(Ordering::Relaxed),
            diverted: self.diverted.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
        }
    }
}

impl Default for LineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of line statistics at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineSnapshot {
    pub overflowed: u32,
    pub fifo_overruns: u32,
    pub line_errors: u32,
    pub diverted: u32,
    pub refused: u32,
}
