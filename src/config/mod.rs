//! Module: config
//!
//! Purpose: Board configuration for the serial transport.
//!
//! Architecture:
//! - Compile-time constants sized for the ESP32 UART block
//! - [`BOARD_PORTS`]: one descriptor per physical UART
//! - [`nvs`]: persistent settings block in a raw flash partition

pub mod nvs;

use crate::serial::{PortDescriptor, StreamFlags};

/// Receive ring size per port (power of 2).
pub const RX_BUFFER_SIZE: usize = 1024;

/// Baud rate used when the primary port is claimed at boot.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Hardware FIFO depth of the ESP32 UART.
pub const UART_FIFO_LEN: usize = 128;

/// RX FIFO level that raises the "FIFO full" interrupt.
pub const RX_FIFO_FULL_THRESHOLD: u8 = 112;

/// Idle time, in symbol periods, before the RX timeout interrupt fires.
pub const RX_TIMEOUT_SYMBOLS: u8 = 50;

/// APB clock feeding the UARTs when no better source is known.
pub const APB_CLOCK_HZ: u32 = 80_000_000;

/// Size of the persisted settings block.
pub const SETTINGS_SIZE: usize = 2048;

/// Label of the raw data partition holding the settings block.
pub const SETTINGS_PARTITION: &str = "grbl";

/// Interrupt sources of UART0..2 on the ESP32.
pub const UART_INTR_SOURCE: [u32; 3] = [34, 35, 36];

/// Whether the UART handler may run with the flash cache disabled.
///
/// False: the handler and everything it reaches (logging, ring buffers,
/// registry) live in flash, so it must not be allocated as an IRAM
/// interrupt. It is deferred during flash erase/program instead.
pub const UART_INTR_IRAM_SAFE: bool = false;

const FULL_DUPLEX: StreamFlags = StreamFlags::CLAIMABLE
    .union(StreamFlags::CONNECTED)
    .union(StreamFlags::CAN_SET_BAUD)
    .union(StreamFlags::MODBUS_READY);

/// UARTs wired on the reference board.
///
/// The tertiary UART has no transmit pin and is therefore receive-only.
pub const BOARD_PORTS: [PortDescriptor; 3] = [
    PortDescriptor {
        instance: 0,
        name: "Primary UART",
        interrupt_source: UART_INTR_SOURCE[0],
        tx_pin: Some(1),
        rx_pin: 3,
        flags: FULL_DUPLEX,
        exclusive: false,
    },
    PortDescriptor {
        instance: 1,
        name: "Secondary UART",
        interrupt_source: UART_INTR_SOURCE[1],
        tx_pin: Some(17),
        rx_pin: 16,
        flags: FULL_DUPLEX,
        exclusive: true,
    },
    PortDescriptor {
        instance: 2,
        name: "Tertiary UART",
        interrupt_source: UART_INTR_SOURCE[2],
        tx_pin: None,
        rx_pin: 26,
        flags: FULL_DUPLEX,
        exclusive: false,
    },
];
