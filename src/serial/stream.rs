//! The stream contract handed out on claim.

use core::sync::atomic::Ordering;

use super::port::{RxQuiesce, SerialPort};
use super::StreamProperties;
use crate::error::SerialError;
use crate::hal::{clock_divider, UartLine};
use crate::realtime::{BlockingCallback, Classifier, RealtimeHandler, RealtimeRedirect};
use crate::stats::LineSnapshot;

/// Handle to a claimed serial port.
///
/// The receive ring has exactly one consumer: the holder of this handle.
/// It is neither `Clone` nor `Copy`, and [`read`](Self::read) takes
/// `&mut self`, so a second reader cannot be made from it.
///
/// ```compile_fail
/// use cnc_serial_stream::hal::UartLine;
/// use cnc_serial_stream::SerialStream;
///
/// fn duplicate<L: UartLine, const N: usize>(s: SerialStream<'static, L, N>) -> [SerialStream<'static, L, N>; 2] {
///     [s, s]
/// }
/// ```
pub struct SerialStream<'a, L: UartLine, const N: usize> {
    pub(super) port: &'a SerialPort<L, N>,
}

impl<'a, L: UartLine, const N: usize> SerialStream<'a, L, N> {
    /// The underlying port.
    pub fn port(&self) -> &'a SerialPort<L, N> {
        self.port
    }

    /// Instance index.
    pub fn instance(&self) -> u8 {
        self.port.descriptor.instance
    }

    /// Current capabilities and claim state.
    pub fn properties(&self) -> StreamProperties {
        self.port.properties()
    }

    /// Next received byte, or `None` when nothing is pending.
    #[inline]
    pub fn read(&mut self) -> Option<u8> {
        self.port.rx.pop()
    }

    /// Queue one byte for transmission.
    ///
    /// While the hardware TX FIFO is full the blocking callback is called on
    /// every poll; when it returns `false` the byte is dropped and
    /// [`SerialError::Refused`] returned. Interrupts stay enabled throughout.
    pub fn write_byte(&self, c: u8) -> Result<(), SerialError> {
        if self.port.is_rx_only() {
            return Err(SerialError::Unsupported);
        }

        let line = &self.port.line;

        loop {
            {
                let _lock = self.port.lock();
                if line.transmit_queue_depth() < line.transmit_capacity() {
                    line.write_transmit_register(c);
                    return Ok(());
                }
            }

            if !(self.port.blocking.load())() {
                return Err(SerialError::Refused);
            }
        }
    }

    /// Write all of `data`, stopping at the first refused byte.
    pub fn write(&self, data: &[u8]) -> Result<(), SerialError> {
        data.iter().try_for_each(|&c| self.write_byte(c))
    }

    /// Write `data` up to (not including) its first NUL byte.
    pub fn write_string(&self, data: &[u8]) -> Result<(), SerialError> {
        data.iter()
            .take_while(|&&c| c != 0)
            .try_for_each(|&c| self.write_byte(c))
    }

    /// Free space in the receive ring.
    #[inline]
    pub fn rx_buffer_free(&self) -> usize {
        self.port.rx.free_space()
    }

    /// Bytes waiting in the receive ring.
    #[inline]
    pub fn rx_buffer_count(&self) -> usize {
        self.port.rx.available()
    }

    /// Bytes not yet on the wire.
    ///
    /// There is no software transmit queue, so this is the hardware FIFO
    /// count plus the byte in the shifter, or 0 once idle.
    pub fn tx_buffer_count(&self) -> usize {
        let line = &self.port.line;
        if line.transmit_idle() {
            0
        } else {
            line.transmit_queue_depth() + 1
        }
    }

    /// Discard pending input (hardware FIFO and ring) and clear overflow.
    pub fn reset_read_buffer(&self) {
        let _lock = self.port.lock();
        let _quiet = RxQuiesce::new(self.port);

        self.port.line.reset(false);
        self.port.rx.flush();
    }

    /// Reset the transmit path and wait for the line to go idle.
    pub fn reset_write_buffer(&self) {
        let _lock = self.port.lock();
        let line = &self.port.line;

        line.reset(true);
        while !line.transmit_idle() {
            core::hint::spin_loop();
        }
    }

    /// Abandon pending input, leaving a single CAN for the reader.
    pub fn cancel_read_buffer(&self) {
        let _lock = self.port.lock();
        let _quiet = RxQuiesce::new(self.port);

        self.port.rx.cancel();
    }

    /// Suspend or resume queuing of normal input.
    ///
    /// Real-time bytes are still dispatched while suspended. Returns `true`
    /// if input is still pending in the ring.
    pub fn suspend_read(&self, suspend: bool) -> bool {
        self.port.rx.suspend(suspend)
    }

    /// Install the predicate for bytes still queued while suspended.
    pub fn set_suspend_escape(&self, escape: Classifier) -> Classifier {
        self.port.rx.set_suspend_escape(escape)
    }

    /// Check if input is suspended.
    pub fn is_suspended(&self) -> bool {
        self.port.rx.is_suspended()
    }

    /// Silence (`true`) or re-arm (`false`) the receiver.
    ///
    /// Disabled means no byte at all is accepted, real-time ones included.
    /// Re-arming discards whatever noise accumulated in the meantime.
    pub fn disable_rx(&self, disable: bool) {
        let _lock = self.port.lock();

        self.port.set_rx_enabled(false);

        if !disable {
            self.port.line.reset(false);
            self.port.rx.flush();
            self.port.line.take_events();
            self.port.set_rx_enabled(true);
        }
    }

    /// Check if the receiver is armed.
    pub fn is_rx_enabled(&self) -> bool {
        self.port.is_rx_enabled()
    }

    /// Change the baud rate.
    ///
    /// Fails without side effects on fixed-rate ports or for rates the
    /// source clock cannot produce.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), SerialError> {
        if !self.properties().flags.contains(super::StreamFlags::CAN_SET_BAUD) {
            log::warn!("{}: baud rate is fixed", self.port.descriptor.name);
            return Err(SerialError::Unsupported);
        }

        let line = &self.port.line;
        let source_clock_hz = line.source_clock_hz();
        if clock_divider(source_clock_hz, baud_rate).is_none() {
            return Err(SerialError::InvalidBaud);
        }

        {
            let _lock = self.port.lock();
            line.set_baud(baud_rate, source_clock_hz);
        }
        self.port.baud_rate.store(baud_rate, Ordering::Release);

        log::info!("{}: baud rate set to {}", self.port.descriptor.name, baud_rate);
        Ok(())
    }

    /// Current baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.port.baud_rate.load(Ordering::Acquire)
    }

    /// Install a new real-time classifier, returning the previous one.
    pub fn set_classifier(&self, classifier: Classifier) -> Classifier {
        self.port.classifier.swap(classifier)
    }

    /// Install a new blocking callback, returning the previous one.
    pub fn set_blocking_callback(&self, callback: BlockingCallback) -> BlockingCallback {
        self.port.blocking.swap(callback)
    }

    /// Offer a byte to the current real-time handler.
    pub fn enqueue_realtime_command(&self, c: u8) -> bool {
        (self.port.handler.load())(c)
    }

    /// Sticky receive overflow flag, cleared by [`SerialStream::reset_read_buffer`].
    pub fn overflow(&self) -> bool {
        self.port.rx.overflow()
    }

    /// Receive statistics.
    pub fn stats(&self) -> LineSnapshot {
        self.port.stats.snapshot()
    }
}

impl<L: UartLine, const N: usize> RealtimeRedirect for SerialStream<'_, L, N> {
    /// Install a new real-time handler, returning the previous one so the
    /// caller can put it back.
    fn set_realtime_handler(&self, handler: RealtimeHandler) -> RealtimeHandler {
        self.port.handler.swap(handler)
    }
}

impl<L: UartLine, const N: usize> core::fmt::Write for SerialStream<'_, L, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}
