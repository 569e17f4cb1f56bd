//! Hardware Abstraction Layer for the serial transport.
//!
//! Two capabilities are all the transport needs from the chip:
//! - [`UartLine`]: register-level access to one UART
//! - [`InterruptController`]: attach a handler to an interrupt source
//!
//! Business logic stays in [`crate::serial`], HAL is just I/O.

pub mod clock;
pub mod uart_regs;

#[cfg(target_os = "espidf")]
pub mod esp32;

use core::ffi::c_void;

use bitflags::bitflags;

use crate::error::SerialError;

bitflags! {
    /// Latched UART interrupt events.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct LineEvents: u32 {
        /// RX FIFO reached its full threshold.
        const RX_FIFO_FULL = 1 << 0;
        /// Parity error on a received byte.
        const PARITY_ERROR = 1 << 2;
        /// Framing error on a received byte.
        const FRAME_ERROR = 1 << 3;
        /// Hardware RX FIFO overflowed before it was drained.
        const RX_FIFO_OVERFLOW = 1 << 4;
        /// Line went idle with bytes in the RX FIFO.
        const RX_TIMEOUT = 1 << 8;
    }
}

impl LineEvents {
    /// Events the receive interrupt is enabled for.
    pub const RX: Self = Self::RX_FIFO_FULL
        .union(Self::RX_FIFO_OVERFLOW)
        .union(Self::RX_TIMEOUT)
        .union(Self::FRAME_ERROR);
}

/// Number of data bits per word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

/// Parity mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// UART word format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordFormat {
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for WordFormat {
    /// 8N1
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Baud clock divider with a 4-bit fractional part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDivider {
    pub integral: u32,
    pub fractional: u8,
}

/// Compute the divider for `baud` from a source clock of `source_clock_hz`.
///
/// Returns `None` for a zero baud rate or one the clock cannot reach.
pub fn clock_divider(source_clock_hz: u32, baud: u32) -> Option<ClockDivider> {
    if baud == 0 {
        return None;
    }

    let div = ((source_clock_hz as u64) << 4) / baud as u64;
    let integral = (div >> 4) as u32;

    if integral == 0 {
        return None;
    }

    Some(ClockDivider {
        integral,
        fractional: (div & 0xF) as u8,
    })
}

/// One UART peripheral.
///
/// Methods take `&self`: registers are shared between the interrupt handler
/// and the foreground task by nature, exclusivity is the caller's business.
pub trait UartLine: Sync {
    /// Enable the peripheral and apply baud rate and word format.
    fn configure(&self, baud_rate: u32, format: WordFormat);

    /// Reprogram the baud divider from the given source clock.
    fn set_baud(&self, baud_rate: u32, source_clock_hz: u32);

    /// Current frequency of the UART source clock.
    fn source_clock_hz(&self) -> u32;

    /// Mask or unmask the receive interrupt events ([`LineEvents::RX`]).
    fn enable_receive_interrupt(&self, enable: bool);

    /// Read and clear the latched interrupt events.
    fn take_events(&self) -> LineEvents;

    /// Bytes waiting in the hardware RX FIFO.
    fn receive_fifo_len(&self) -> usize;

    /// Pop one byte from the hardware RX FIFO.
    fn read_receive_register(&self) -> u8;

    /// Bytes waiting in the hardware TX FIFO.
    fn transmit_queue_depth(&self) -> usize;

    /// Size of the hardware TX FIFO.
    fn transmit_capacity(&self) -> usize;

    /// True once the TX FIFO is empty and the shifter is idle.
    fn transmit_idle(&self) -> bool;

    /// Push one byte into the hardware TX FIFO.
    fn write_transmit_register(&self, byte: u8);

    /// Reset the TX FIFO, and the RX FIFO too unless `tx_only`.
    fn reset(&self, tx_only: bool);
}

/// Interrupt service routine signature.
pub type IsrFn = unsafe extern "C" fn(arg: *mut c_void);

/// Opaque token returned by [`InterruptController::attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptHandle(pub usize);

/// Attach handlers to hardware interrupt sources.
pub trait InterruptController {
    /// Route `source` to `isr`, which is called with `arg`.
    ///
    /// The handler runs with the event flags latched and must clear them.
    fn attach(&self, source: u32, isr: IsrFn, arg: *mut c_void) -> Result<InterruptHandle, SerialError>;
}
