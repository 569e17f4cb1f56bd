//! ESP32 UART register block.
//!
//! Register logic kept apart from the IDF calls in `hal::esp32` so it
//! can run against any [`RegisterBlock`], memory-mapped or not.
//!
//! # Register Map (offsets from the APB base)
//!
//! | Offset | Name    | Description                        |
//! |--------|---------|------------------------------------|
//! | 0x00   | FIFO    | RX FIFO read (APB), TX via AHB     |
//! | 0x08   | INT_ST  | Masked interrupt status            |
//! | 0x0C   | INT_ENA | Interrupt enable                   |
//! | 0x10   | INT_CLR | Interrupt clear                    |
//! | 0x14   | CLKDIV  | Baud divider, 20.4 fixed point     |
//! | 0x1C   | STATUS  | FIFO counts, transmitter state     |
//! | 0x20   | CONF0   | Word format, FIFO resets           |
//! | 0x24   | CONF1   | RX thresholds and timeout          |

use core::ptr;

use super::{ClockDivider, DataBits, LineEvents, Parity, StopBits, WordFormat};

pub const UART_FIFO: usize = 0x00;
pub const UART_INT_ST: usize = 0x08;
pub const UART_INT_ENA: usize = 0x0C;
pub const UART_INT_CLR: usize = 0x10;
pub const UART_CLKDIV: usize = 0x14;
pub const UART_STATUS: usize = 0x1C;
pub const UART_CONF0: usize = 0x20;
pub const UART_CONF1: usize = 0x24;

const STATUS_RXFIFO_CNT: u32 = 0xFF;
const STATUS_TXFIFO_CNT_SHIFT: u32 = 16;
const STATUS_UTX_OUT_SHIFT: u32 = 24;

pub const CONF0_PARITY: u32 = 1 << 0;
pub const CONF0_PARITY_EN: u32 = 1 << 1;
const CONF0_BIT_NUM_SHIFT: u32 = 2;
const CONF0_STOP_BIT_NUM_SHIFT: u32 = 4;
const CONF0_FORMAT_MASK: u32 = 0x3F;
pub const CONF0_TXFIFO_RST: u32 = 1 << 18;

const CONF1_RXFIFO_FULL_MASK: u32 = 0x7F;
const CONF1_RX_TOUT_SHIFT: u32 = 24;
const CONF1_RX_TOUT_MASK: u32 = 0x7F << CONF1_RX_TOUT_SHIFT;
pub const CONF1_RX_TOUT_EN: u32 = 1 << 31;

const CLKDIV_FRAG_SHIFT: u32 = 20;

/// APB register base and AHB FIFO alias of one UART.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UartAddresses {
    pub apb_base: usize,
    pub ahb_fifo: usize,
}

const UART_ADDRESSES: [UartAddresses; 3] = [
    UartAddresses {
        apb_base: 0x3FF4_0000,
        ahb_fifo: 0x6000_0000,
    },
    UartAddresses {
        apb_base: 0x3FF5_0000,
        ahb_fifo: 0x6001_0000,
    },
    UartAddresses {
        apb_base: 0x3FF6_E000,
        ahb_fifo: 0x6002_E000,
    },
];

/// Addresses of UART `instance`, or `None` past UART2.
pub fn uart_addresses(instance: u8) -> Option<UartAddresses> {
    UART_ADDRESSES.get(instance as usize).copied()
}

/// 32-bit register access by offset.
pub trait RegisterBlock: Sync {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
}

/// Memory-mapped registers at a fixed base.
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the address of a peripheral register block that stays
    /// mapped for the life of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterBlock for Mmio {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: fixed, aligned peripheral register (see `Mmio::new`)
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// Register-level operations of one UART.
pub struct UartRegs<R: RegisterBlock> {
    regs: R,
}

impl<R: RegisterBlock> UartRegs<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// The underlying register block.
    pub fn block(&self) -> &R {
        &self.regs
    }

    #[inline(always)]
    fn modify(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.regs.read(offset);
        self.regs.write(offset, f(value));
    }

    pub fn set_divider(&self, div: ClockDivider) {
        self.regs
            .write(UART_CLKDIV, div.integral | (u32::from(div.fractional) << CLKDIV_FRAG_SHIFT));
    }

    pub fn set_format(&self, format: WordFormat) {
        self.modify(UART_CONF0, |v| (v & !CONF0_FORMAT_MASK) | word_format_bits(format));
    }

    /// RX FIFO full threshold (bytes) and idle timeout (symbol times).
    pub fn set_rx_thresholds(&self, full: u8, timeout_symbols: u8) {
        self.modify(UART_CONF1, |v| {
            (v & !(CONF1_RXFIFO_FULL_MASK | CONF1_RX_TOUT_MASK))
                | (u32::from(full) & CONF1_RXFIFO_FULL_MASK)
                | ((u32::from(timeout_symbols) << CONF1_RX_TOUT_SHIFT) & CONF1_RX_TOUT_MASK)
                | CONF1_RX_TOUT_EN
        });
    }

    /// Mask or unmask the receive events.
    ///
    /// Latched events are left alone: a byte that arrived while masked
    /// still raises the interrupt once unmasked.
    pub fn enable_rx_events(&self, enable: bool) {
        let rx = LineEvents::RX.bits();
        self.modify(UART_INT_ENA, |v| if enable { v | rx } else { v & !rx });
    }

    #[inline(always)]
    pub fn take_events(&self) -> LineEvents {
        let status = self.regs.read(UART_INT_ST);
        self.regs.write(UART_INT_CLR, status);
        LineEvents::from_bits_truncate(status)
    }

    #[inline(always)]
    pub fn rx_fifo_len(&self) -> usize {
        (self.regs.read(UART_STATUS) & STATUS_RXFIFO_CNT) as usize
    }

    #[inline(always)]
    pub fn read_rx(&self) -> u8 {
        self.regs.read(UART_FIFO) as u8
    }

    #[inline(always)]
    pub fn tx_fifo_len(&self) -> usize {
        ((self.regs.read(UART_STATUS) >> STATUS_TXFIFO_CNT_SHIFT) & 0xFF) as usize
    }

    #[inline(always)]
    pub fn tx_idle(&self) -> bool {
        let status = self.regs.read(UART_STATUS);
        (status >> STATUS_TXFIFO_CNT_SHIFT) & 0xFF == 0 && (status >> STATUS_UTX_OUT_SHIFT) & 0xF == 0
    }

    /// Reset the TX FIFO, and empty the RX FIFO too unless `tx_only`.
    pub fn reset(&self, tx_only: bool) {
        self.modify(UART_CONF0, |v| v | CONF0_TXFIFO_RST);
        self.modify(UART_CONF0, |v| v & !CONF0_TXFIFO_RST);

        if !tx_only {
            // The RX FIFO reset bit is unreliable on this chip: drain by reading
            while self.rx_fifo_len() > 0 {
                self.read_rx();
            }
        }
    }
}

fn word_format_bits(format: WordFormat) -> u32 {
    let bit_num: u32 = match format.data_bits {
        DataBits::Five => 0,
        DataBits::Six => 1,
        DataBits::Seven => 2,
        DataBits::Eight => 3,
    };
    let stop_bits: u32 = match format.stop_bits {
        StopBits::One => 1,
        StopBits::OneAndHalf => 2,
        StopBits::Two => 3,
    };
    let parity = match format.parity {
        Parity::None => 0,
        Parity::Even => CONF0_PARITY_EN,
        Parity::Odd => CONF0_PARITY_EN | CONF0_PARITY,
    };

    (bit_num << CONF0_BIT_NUM_SHIFT) | (stop_bits << CONF0_STOP_BIT_NUM_SHIFT) | parity
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::vec::Vec;

    /// Register file with a live RX FIFO and a write journal.
    #[derive(Default)]
    struct FakeRegs {
        regs: Mutex<[u32; 16]>,
        rx: Mutex<VecDeque<u8>>,
        writes: Mutex<Vec<(usize, u32)>>,
    }

    impl FakeRegs {
        fn get(&self, offset: usize) -> u32 {
            self.regs.lock().unwrap()[offset / 4]
        }

        fn set(&self, offset: usize, value: u32) {
            self.regs.lock().unwrap()[offset / 4] = value;
        }
    }

    impl RegisterBlock for FakeRegs {
        fn read(&self, offset: usize) -> u32 {
            match offset {
                UART_FIFO => self.rx.lock().unwrap().pop_front().map_or(0, u32::from),
                UART_STATUS => (self.get(UART_STATUS) & !0xFF) | self.rx.lock().unwrap().len() as u32,
                _ => self.get(offset),
            }
        }

        fn write(&self, offset: usize, value: u32) {
            self.writes.lock().unwrap().push((offset, value));
            if offset == UART_INT_CLR {
                let st = self.get(UART_INT_ST);
                self.set(UART_INT_ST, st & !value);
            } else {
                self.set(offset, value);
            }
        }
    }

    #[test]
    fn test_addresses_stop_at_uart2() {
        assert_eq!(uart_addresses(2).unwrap().apb_base, 0x3FF6_E000);
        assert_eq!(uart_addresses(3), None);
        assert_eq!(uart_addresses(u8::MAX), None);
    }

    #[test]
    fn test_unmask_keeps_latched_events() {
        let uart = UartRegs::new(FakeRegs::default());
        uart.enable_rx_events(true);

        // Masked window: a byte arrives and latches the idle timeout
        uart.enable_rx_events(false);
        uart.block().set(UART_INT_ST, LineEvents::RX_TIMEOUT.bits());
        uart.enable_rx_events(true);

        assert!(uart.block().writes.lock().unwrap().iter().all(|&(o, _)| o != UART_INT_CLR));
        assert_eq!(uart.block().get(UART_INT_ENA), LineEvents::RX.bits());
        assert_eq!(uart.take_events(), LineEvents::RX_TIMEOUT);
        assert!(uart.take_events().is_empty());
    }

    #[test]
    fn test_reset_drains_rx_fifo() {
        let uart = UartRegs::new(FakeRegs::default());
        uart.block().rx.lock().unwrap().extend(b"noise");
        assert_eq!(uart.rx_fifo_len(), 5);

        uart.reset(true);
        assert_eq!(uart.rx_fifo_len(), 5, "tx-only reset keeps rx");

        uart.reset(false);
        assert_eq!(uart.rx_fifo_len(), 0);

        // TX reset is pulsed, and nothing else in CONF0 changes
        let conf0: Vec<u32> = uart
            .block()
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|&&(o, _)| o == UART_CONF0)
            .map(|&(_, v)| v)
            .collect();
        assert_eq!(conf0, [CONF0_TXFIFO_RST, 0, CONF0_TXFIFO_RST, 0]);
    }

    #[test]
    fn test_format_and_thresholds() {
        let uart = UartRegs::new(FakeRegs::default());

        uart.set_format(WordFormat::default());
        // 8 data bits, 1 stop bit, no parity
        assert_eq!(uart.block().get(UART_CONF0), (3 << 2) | (1 << 4));

        uart.set_format(WordFormat {
            parity: Parity::Odd,
            ..WordFormat::default()
        });
        assert_eq!(uart.block().get(UART_CONF0) & 0x3, CONF0_PARITY_EN | CONF0_PARITY);

        uart.set_rx_thresholds(112, 50);
        assert_eq!(uart.block().get(UART_CONF1), 112 | (50 << 24) | CONF1_RX_TOUT_EN);
    }

    #[test]
    fn test_divider_layout() {
        let uart = UartRegs::new(FakeRegs::default());
        uart.set_divider(ClockDivider {
            integral: 694,
            fractional: 7,
        });
        assert_eq!(uart.block().get(UART_CLKDIV), 694 | (7 << 20));
    }
}
