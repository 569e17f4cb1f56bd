//! Simulated UART and interrupt controller shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ffi::c_void;
use std::sync::Mutex;

use cnc_serial_stream::config::BOARD_PORTS;
use cnc_serial_stream::hal::{InterruptController, InterruptHandle, IsrFn, LineEvents, UartLine, WordFormat};
use cnc_serial_stream::{SerialError, SerialRegistry};

/// Receive ring size used by the tests (15 usable bytes).
pub const TEST_RX_SIZE: usize = 16;

pub type SimRegistry = SerialRegistry<SimLine, TEST_RX_SIZE, 3>;

#[derive(Default)]
struct SimState {
    rx_fifo: VecDeque<u8>,
    sent: Vec<u8>,
    tx_stuck: bool,
    irq_enabled: bool,
    irq_log: Vec<bool>,
    events: LineEvents,
    baud: u32,
    format: Option<WordFormat>,
    resets: Vec<bool>,
}

/// In-memory UART.
///
/// Transmitted bytes land in `sent` immediately unless the line is
/// stuck, in which case the TX FIFO reports full until reset.
pub struct SimLine {
    state: Mutex<SimState>,
}

impl SimLine {
    pub const CLOCK_HZ: u32 = 80_000_000;
    pub const TX_CAPACITY: usize = 128;

    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    /// Bytes arriving on the wire.
    pub fn inject(&self, bytes: &[u8]) {
        let mut s = self.state.lock().unwrap();
        s.rx_fifo.extend(bytes.iter().copied());
        if !bytes.is_empty() {
            s.events |= LineEvents::RX_TIMEOUT;
        }
    }

    /// Latch extra events for the next interrupt.
    pub fn latch(&self, events: LineEvents) {
        self.state.lock().unwrap().events |= events;
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().unwrap().tx_stuck = stuck;
    }

    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn irq_enabled(&self) -> bool {
        self.state.lock().unwrap().irq_enabled
    }

    /// Every enable/disable of the receive interrupt, in order.
    pub fn irq_log(&self) -> Vec<bool> {
        self.state.lock().unwrap().irq_log.clone()
    }

    pub fn baud(&self) -> u32 {
        self.state.lock().unwrap().baud
    }

    pub fn format(&self) -> Option<WordFormat> {
        self.state.lock().unwrap().format
    }

    /// `tx_only` argument of every FIFO reset, in order.
    pub fn resets(&self) -> Vec<bool> {
        self.state.lock().unwrap().resets.clone()
    }

    pub fn pending_rx(&self) -> usize {
        self.state.lock().unwrap().rx_fifo.len()
    }
}

impl UartLine for SimLine {
    fn configure(&self, baud_rate: u32, format: WordFormat) {
        let mut s = self.state.lock().unwrap();
        s.baud = baud_rate;
        s.format = Some(format);
    }

    fn set_baud(&self, baud_rate: u32, _source_clock_hz: u32) {
        self.state.lock().unwrap().baud = baud_rate;
    }

    fn source_clock_hz(&self) -> u32 {
        Self::CLOCK_HZ
    }

    fn enable_receive_interrupt(&self, enable: bool) {
        let mut s = self.state.lock().unwrap();
        s.irq_enabled = enable;
        s.irq_log.push(enable);
    }

    fn take_events(&self) -> LineEvents {
        std::mem::take(&mut self.state.lock().unwrap().events)
    }

    fn receive_fifo_len(&self) -> usize {
        self.state.lock().unwrap().rx_fifo.len()
    }

    fn read_receive_register(&self) -> u8 {
        self.state.lock().unwrap().rx_fifo.pop_front().unwrap_or(0)
    }

    fn transmit_queue_depth(&self) -> usize {
        if self.state.lock().unwrap().tx_stuck {
            Self::TX_CAPACITY
        } else {
            0
        }
    }

    fn transmit_capacity(&self) -> usize {
        Self::TX_CAPACITY
    }

    fn transmit_idle(&self) -> bool {
        !self.state.lock().unwrap().tx_stuck
    }

    fn write_transmit_register(&self, byte: u8) {
        self.state.lock().unwrap().sent.push(byte);
    }

    fn reset(&self, tx_only: bool) {
        let mut s = self.state.lock().unwrap();
        s.tx_stuck = false;
        if !tx_only {
            s.rx_fifo.clear();
        }
        s.resets.push(tx_only);
    }
}

/// Interrupt controller that records attachments and fires them on demand.
#[derive(Default)]
pub struct SimInterrupts {
    attached: Mutex<Vec<(u32, IsrFn, usize)>>,
    fail: bool,
}

impl SimInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller rejecting every attach.
    pub fn failing() -> Self {
        Self {
            attached: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn attached_sources(&self) -> Vec<u32> {
        self.attached.lock().unwrap().iter().map(|(s, _, _)| *s).collect()
    }

    /// Run the handler attached to `source`, if any.
    pub fn fire(&self, source: u32) {
        let found = self
            .attached
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _, _)| *s == source)
            .map(|&(_, isr, arg)| (isr, arg));

        if let Some((isr, arg)) = found {
            unsafe { isr(arg as *mut c_void) };
        }
    }

    /// Deliver `bytes` and raise the receive interrupt if it is unmasked.
    pub fn raise_rx(&self, line: &SimLine, source: u32, bytes: &[u8]) {
        line.inject(bytes);
        if line.irq_enabled() {
            self.fire(source);
        }
    }
}

impl InterruptController for SimInterrupts {
    fn attach(&self, source: u32, isr: IsrFn, arg: *mut c_void) -> Result<InterruptHandle, SerialError> {
        if self.fail {
            return Err(SerialError::InterruptAttach);
        }

        let mut attached = self.attached.lock().unwrap();
        attached.push((source, isr, arg as usize));
        Ok(InterruptHandle(attached.len()))
    }
}

/// Leaked registry over the board's descriptors with simulated lines.
pub fn board_registry() -> &'static SimRegistry {
    Box::leak(Box::new(SerialRegistry::new(
        BOARD_PORTS.map(|descriptor| (descriptor, SimLine::new())),
    )))
}
