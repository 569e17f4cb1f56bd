//! Lock-free receive ring buffer.
//!
//! SPSC: the UART interrupt handler is the only producer, the foreground
//! protocol task the only consumer.
//!
//! # Ownership
//!
//! - Producer writes `head` only
//! - Consumer writes `tail` only
//! - Payload byte is written before the `Release` store of `head`
//!
//! [`RxBuffer::flush`] and [`RxBuffer::cancel`] touch both indices and must
//! run with the producer quiesced (receive interrupt masked).

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::realtime::{never_realtime, AtomicFn, Classifier};

/// Cancel sentinel injected by [`RxBuffer::cancel`].
pub const ASCII_CAN: u8 = 0x18;

/// Result of a producer push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Byte queued.
    Accepted,
    /// Buffer full: byte dropped, overflow flag set.
    Overflowed,
    /// Buffer suspended and the byte did not match the escape predicate.
    Refused,
}

/// Fixed-capacity receive ring.
///
/// N must be a power of 2. One slot is kept free to tell full from empty,
/// so N - 1 bytes are usable.
pub struct RxBuffer<const N: usize> {
    data: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    overflow: AtomicBool,
    suspended: AtomicBool,
    escape: AtomicFn<Classifier>,
}

// SAFETY: single producer writes the slot at `head` then publishes `head`;
// single consumer reads the slot at `tail` only while `tail != head`.
// The two never address the same slot concurrently.
unsafe impl<const N: usize> Sync for RxBuffer<N> {}
unsafe impl<const N: usize> Send for RxBuffer<N> {}

impl<const N: usize> RxBuffer<N> {
    const MASK: usize = N - 1;

    /// Create an empty buffer.
    pub fn new() -> Self {
        const { assert!(N.is_power_of_two() && N >= 2, "Buffer size must be power of 2") };

        Self {
            data: UnsafeCell::new([0u8; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            escape: AtomicFn::new(never_realtime as Classifier),
        }
    }

    /// Push a byte (producer only, never blocks).
    #[inline]
    pub fn push(&self, byte: u8) -> PushOutcome {
        if self.suspended.load(Ordering::Acquire) && !(self.escape.load())(byte) {
            return PushOutcome::Refused;
        }

        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & Self::MASK;

        if next == self.tail.load(Ordering::Acquire) {
            self.overflow.store(true, Ordering::Release);
            return PushOutcome::Overflowed;
        }

        // SAFETY: slot `head` is not visible to the consumer until published
        unsafe {
            (*self.data.get())[head] = byte;
        }
        self.head.store(next, Ordering::Release);

        PushOutcome::Accepted
    }

    /// Set the overflow flag without pushing (producer only).
    ///
    /// Used when the hardware FIFO itself overran.
    #[inline]
    pub fn mark_overflow(&self) {
        self.overflow.store(true, Ordering::Release);
    }

    /// Pop the oldest byte (consumer only).
    ///
    /// Returns None if buffer is empty.
    #[inline]
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: slot `tail` was published by the producer's Release store
        let byte = unsafe { (*self.data.get())[tail] };
        self.tail.store((tail + 1) & Self::MASK, Ordering::Release);

        Some(byte)
    }

    /// Number of bytes waiting.
    #[inline]
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & Self::MASK
    }

    /// Free slots.
    #[inline]
    pub fn free_space(&self) -> usize {
        Self::capacity() - self.available()
    }

    /// Usable capacity (N - 1).
    #[inline]
    pub const fn capacity() -> usize {
        N - 1
    }

    /// Check if buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Sticky overflow flag.
    #[inline]
    pub fn overflow(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    /// Discard all pending input and clear overflow.
    ///
    /// Producer must be quiesced.
    pub fn flush(&self) {
        let head = self.head.load(Ordering::Acquire);
        self.tail.store(head, Ordering::Release);
        self.overflow.store(false, Ordering::Release);
    }

    /// Discard all pending input, leaving a single [`ASCII_CAN`] to read.
    ///
    /// The sentinel slot is always written, whatever stale byte it held.
    /// Producer must be quiesced.
    pub fn cancel(&self) {
        let head = self.head.load(Ordering::Acquire);

        // SAFETY: producer quiesced, consumer is the caller
        unsafe {
            (*self.data.get())[head] = ASCII_CAN;
        }
        self.tail.store(head, Ordering::Release);
        self.head.store((head + 1) & Self::MASK, Ordering::Release);
        self.overflow.store(false, Ordering::Release);
    }

    /// Suspend or resume queuing of normal payload.
    ///
    /// Returns `true` if input is still pending in the buffer.
    pub fn suspend(&self, suspend: bool) -> bool {
        self.suspended.store(suspend, Ordering::Release);
        !self.is_empty()
    }

    /// Check if queuing is suspended.
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Install the predicate for bytes still queued while suspended.
    pub fn set_suspend_escape(&self, escape: Classifier) -> Classifier {
        self.escape.swap(escape)
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
