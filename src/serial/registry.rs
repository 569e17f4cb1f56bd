//! Registry of UART instances.

use super::{PortDescriptor, SerialPort, SerialStream, StreamProperties, StreamType};
use crate::error::SerialError;
use crate::hal::{InterruptController, UartLine};
use crate::realtime::BlockingCallback;

/// Owns every UART instance of the board.
///
/// Ports are addressed by descriptor index, never through free-standing
/// globals, so several registries (e.g. simulated ones) can coexist.
pub struct SerialRegistry<L: UartLine, const N: usize, const P: usize> {
    ports: [SerialPort<L, N>; P],
}

impl<L: UartLine, const N: usize, const P: usize> SerialRegistry<L, N, P> {
    /// Build the registry from descriptor/line pairs.
    pub fn new(entries: [(PortDescriptor, L); P]) -> Self {
        Self {
            ports: entries.map(|(descriptor, line)| SerialPort::new(descriptor, line)),
        }
    }

    /// Capabilities and claim state of every instance.
    pub fn enumerate(&self) -> [StreamProperties; P] {
        core::array::from_fn(|i| self.ports[i].properties())
    }

    /// Port with the given instance index.
    pub fn port(&self, instance: u8) -> Option<&SerialPort<L, N>> {
        self.ports.iter().find(|p| p.descriptor().instance == instance)
    }

    /// All ports.
    pub fn ports(&self) -> &[SerialPort<L, N>] {
        &self.ports
    }

    /// Blocking callback for every port's transmit path.
    pub fn set_blocking_callback(&self, callback: BlockingCallback) {
        for port in &self.ports {
            port.blocking.store(callback);
        }
    }

    /// Claim an instance.
    ///
    /// Configures the line at `baud_rate`, flushes it, attaches the
    /// interrupt handler on first use and arms the receiver (unless the
    /// port is receive-only). A port can be claimed once; later attempts
    /// fail with [`SerialError::ClaimConflict`] and leave it untouched.
    pub fn claim<I: InterruptController>(
        &'static self,
        properties: &StreamProperties,
        baud_rate: u32,
        irq: &I,
    ) -> Result<SerialStream<'static, L, N>, SerialError> {
        if properties.kind != StreamType::Serial {
            return Err(SerialError::UnknownInstance);
        }

        let port = self.port(properties.instance).ok_or(SerialError::UnknownInstance)?;

        if let Err(e) = port.open(baud_rate, irq) {
            log::warn!("claim uart{} failed: {}", properties.instance, e);
            return Err(e);
        }

        Ok(SerialStream { port })
    }
}
