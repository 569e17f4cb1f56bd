//! Serial stream transport.
//!
//! One generic implementation serves every UART: a [`SerialRegistry`] owns
//! an array of [`SerialPort`]s built from [`PortDescriptor`]s, and hands out
//! a [`SerialStream`] handle when a port is claimed.
//!
//! # Data flow
//!
//! ```text
//! UART RX FIFO ──▶ on_interrupt ──▶ classifier ──▶ handler ──▶ (consumed)
//!                                       │             │
//!                                       └──────┬──────┘
//!                                              ▼
//!                                           RxBuffer ──▶ SerialStream::read
//!
//! SerialStream::write_byte ──▶ UART TX FIFO (blocking callback while full)
//! ```

mod port;
mod registry;
mod stream;

pub use port::SerialPort;
pub use registry::SerialRegistry;
pub use stream::SerialStream;

use bitflags::bitflags;

bitflags! {
    /// Capability and state flags advertised per instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamFlags: u8 {
        /// Instance may be claimed.
        const CLAIMABLE = 1 << 0;
        /// Instance has been claimed.
        const CLAIMED = 1 << 1;
        /// Physically connected.
        const CONNECTED = 1 << 2;
        /// Baud rate may be changed after claim.
        const CAN_SET_BAUD = 1 << 3;
        /// No transmit pin.
        const RX_ONLY = 1 << 4;
        /// Full duplex, usable by a bus protocol (e.g. Modbus RTU).
        const MODBUS_READY = 1 << 5;
    }
}

/// Transport family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamType {
    Serial,
}

/// Static description of one UART instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Instance index, unique within a registry.
    pub instance: u8,
    /// Human readable name.
    pub name: &'static str,
    /// Interrupt source number handed to the interrupt controller.
    pub interrupt_source: u32,
    /// Transmit pin, `None` for receive-only wiring.
    pub tx_pin: Option<u8>,
    /// Receive pin.
    pub rx_pin: u8,
    /// Advertised capabilities.
    pub flags: StreamFlags,
    /// Guard configuration and transmit paths with a per-port lock, for
    /// ports written from more than one task.
    pub exclusive: bool,
}

impl PortDescriptor {
    /// Capabilities after wiring constraints are applied.
    ///
    /// Without a transmit pin the port is receive-only and cannot carry a
    /// bus protocol.
    pub fn effective_flags(&self) -> StreamFlags {
        let mut flags = self.flags - StreamFlags::CLAIMED;
        if self.tx_pin.is_none() {
            flags.insert(StreamFlags::RX_ONLY);
            flags.remove(StreamFlags::MODBUS_READY);
        }
        flags
    }
}

/// What [`SerialRegistry::enumerate`] reports per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamProperties {
    pub kind: StreamType,
    pub instance: u8,
    pub flags: StreamFlags,
}

impl StreamProperties {
    /// Check if a claim could succeed right now.
    pub fn is_available(&self) -> bool {
        self.flags.contains(StreamFlags::CLAIMABLE) && !self.flags.contains(StreamFlags::CLAIMED)
    }
}
