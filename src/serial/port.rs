//! One UART instance: interrupt path, receive ring, claim gate.

use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::{Mutex, MutexGuard, Once};

use super::{PortDescriptor, StreamFlags, StreamProperties, StreamType};
use crate::error::SerialError;
use crate::hal::{clock_divider, InterruptController, InterruptHandle, IsrFn, LineEvents, UartLine, WordFormat};
use crate::log_globals::RT_LOG_STREAM;
use crate::realtime::{
    enqueue_realtime_command, is_realtime, keep_waiting, AtomicFn, BlockingCallback, Classifier, RealtimeHandler,
    RealtimeRedirect,
};
use crate::ring_buffer::{PushOutcome, RxBuffer};
use crate::stats::LineStats;

/// A UART with its receive ring and dispatch strategies.
///
/// Constructed once at boot and never torn down. The interrupt handler is
/// the sole producer into `rx`; the [`super::SerialStream`] holder is the
/// sole consumer.
pub struct SerialPort<L: UartLine, const N: usize> {
    pub(super) descriptor: PortDescriptor,
    pub(super) line: L,
    pub(super) rx: RxBuffer<N>,
    pub(super) classifier: AtomicFn<Classifier>,
    pub(super) handler: AtomicFn<RealtimeHandler>,
    pub(super) blocking: AtomicFn<BlockingCallback>,
    pub(super) stats: LineStats,
    pub(super) baud_rate: AtomicU32,
    claimed: AtomicBool,
    rx_enabled: AtomicBool,
    irq: Once<InterruptHandle>,
    lock: Mutex<()>,
}

impl<L: UartLine, const N: usize> SerialPort<L, N> {
    /// Create an unclaimed port.
    pub fn new(descriptor: PortDescriptor, line: L) -> Self {
        Self {
            descriptor,
            line,
            rx: RxBuffer::new(),
            classifier: AtomicFn::new(is_realtime as Classifier),
            handler: AtomicFn::new(enqueue_realtime_command as RealtimeHandler),
            blocking: AtomicFn::new(keep_waiting as BlockingCallback),
            stats: LineStats::new(),
            baud_rate: AtomicU32::new(0),
            claimed: AtomicBool::new(false),
            rx_enabled: AtomicBool::new(false),
            irq: Once::new(),
            lock: Mutex::new(()),
        }
    }

    /// Static description.
    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    /// The hardware line.
    pub fn line(&self) -> &L {
        &self.line
    }

    /// Current capabilities and claim state.
    pub fn properties(&self) -> StreamProperties {
        let mut flags = self.descriptor.effective_flags();
        flags.set(StreamFlags::CLAIMED, self.is_claimed());

        StreamProperties {
            kind: StreamType::Serial,
            instance: self.descriptor.instance,
            flags,
        }
    }

    /// Check if the one-shot claim has been taken.
    #[inline]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Check if receive interrupts are armed.
    #[inline]
    pub fn is_rx_enabled(&self) -> bool {
        self.rx_enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn is_rx_only(&self) -> bool {
        self.descriptor.effective_flags().contains(StreamFlags::RX_ONLY)
    }

    /// Interrupt service body.
    ///
    /// Clears the latched events, then drains the hardware RX FIFO byte by
    /// byte through [`SerialPort::receive_byte`]. Never blocks, never fails.
    pub fn on_interrupt(&self) {
        let count = self.line.receive_fifo_len();
        let events = self.line.take_events();

        if events.contains(LineEvents::RX_FIFO_OVERFLOW) {
            self.stats.note_fifo_overrun();
            if !self.rx.overflow() {
                crate::rt_warn!(RT_LOG_STREAM, self.descriptor.instance, "hardware rx fifo overrun");
            }
            self.rx.mark_overflow();
        }

        if events.intersects(LineEvents::FRAME_ERROR | LineEvents::PARITY_ERROR) {
            self.stats.note_line_error();
        }

        for _ in 0..count {
            let c = self.line.read_receive_register();
            self.receive_byte(c);
        }
    }

    /// Classify, dispatch or queue one received byte.
    ///
    /// Producer side: call only from the port's interrupt context (or with
    /// the interrupt masked).
    #[inline]
    pub fn receive_byte(&self, c: u8) {
        if (self.classifier.load())(c) && (self.handler.load())(c) {
            self.stats.note_diverted();
            return;
        }

        let was_overflowing = self.rx.overflow();

        match self.rx.push(c) {
            PushOutcome::Accepted => {}
            PushOutcome::Overflowed => {
                self.stats.note_overflow();
                if !was_overflowing {
                    crate::rt_warn!(RT_LOG_STREAM, self.descriptor.instance, "rx buffer full, input dropped");
                }
            }
            PushOutcome::Refused => self.stats.note_refused(),
        }
    }

    /// Arm or disarm the receive interrupt.
    pub(super) fn set_rx_enabled(&self, enable: bool) {
        self.rx_enabled.store(enable, Ordering::Release);
        self.line.enable_receive_interrupt(enable);
    }

    /// Per-port lock, only for exclusive ports.
    #[inline]
    pub(super) fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.descriptor.exclusive.then(|| self.lock.lock())
    }

    /// Claim, configure and arm the port.
    pub(super) fn open<I: InterruptController>(&'static self, baud_rate: u32, irq: &I) -> Result<(), SerialError> {
        if !self.descriptor.effective_flags().contains(StreamFlags::CLAIMABLE) {
            return Err(SerialError::NotClaimable);
        }
        if clock_divider(self.line.source_clock_hz(), baud_rate).is_none() {
            return Err(SerialError::InvalidBaud);
        }
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SerialError::ClaimConflict);
        }

        {
            let _lock = self.lock();
            self.line.configure(baud_rate, WordFormat::default());
        }
        self.baud_rate.store(baud_rate, Ordering::Release);

        self.line.reset(false);
        self.rx.flush();

        if let Err(e) = self.attach(irq) {
            self.claimed.store(false, Ordering::Release);
            log::error!("{}: {}", self.descriptor.name, e);
            return Err(e);
        }

        self.line.take_events();
        // Without a transmit pin the receiver stays disarmed until the owner
        // calls disable_rx(false).
        self.set_rx_enabled(!self.is_rx_only());

        log::info!(
            "{} (uart{}) claimed at {} baud{}",
            self.descriptor.name,
            self.descriptor.instance,
            baud_rate,
            if self.is_rx_only() { ", receive only" } else { "" }
        );

        Ok(())
    }

    /// Attach the interrupt handler, once per port lifetime.
    fn attach<I: InterruptController>(&'static self, irq: &I) -> Result<(), SerialError> {
        if self.irq.get().is_some() {
            return Ok(());
        }

        let isr: IsrFn = isr_trampoline::<L, N>;
        let arg = self as *const Self as *mut c_void;
        let handle = irq.attach(self.descriptor.interrupt_source, isr, arg)?;
        self.irq.call_once(|| handle);

        Ok(())
    }
}

impl<L: UartLine, const N: usize> RealtimeRedirect for SerialPort<L, N> {
    fn set_realtime_handler(&self, handler: RealtimeHandler) -> RealtimeHandler {
        self.handler.swap(handler)
    }
}

/// Entry point registered with the interrupt controller.
///
/// # Safety
///
/// `arg` must be the `&'static SerialPort<L, N>` passed in `attach`.
unsafe extern "C" fn isr_trampoline<L: UartLine, const N: usize>(arg: *mut c_void) {
    // SAFETY: see above; ports live for the whole program
    let port = unsafe { &*(arg as *const SerialPort<L, N>) };
    port.on_interrupt();
}

/// Masks the port's receive interrupt for the guard's lifetime.
///
/// Only this port's RX events are masked, not interrupts globally.
pub(super) struct RxQuiesce<'a, L: UartLine, const N: usize> {
    port: &'a SerialPort<L, N>,
    was_enabled: bool,
}

impl<'a, L: UartLine, const N: usize> RxQuiesce<'a, L, N> {
    pub(super) fn new(port: &'a SerialPort<L, N>) -> Self {
        let was_enabled = port.is_rx_enabled();
        if was_enabled {
            port.line.enable_receive_interrupt(false);
        }
        Self { port, was_enabled }
    }
}

impl<L: UartLine, const N: usize> Drop for RxQuiesce<'_, L, N> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.port.line.enable_receive_interrupt(true);
        }
    }
}
