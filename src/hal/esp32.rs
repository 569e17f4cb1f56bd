//! ESP32 UART line and interrupt allocation.
//!
//! The IDF UART driver is not used: it owns the interrupt and its own ring
//! buffers. Registers are driven through [`UartRegs`]; pins, clocks and
//! interrupt allocation still go through IDF.
//!
//! # Flash operations
//!
//! The handler is allocated without `ESP_INTR_FLAG_IRAM`. IDF holds such
//! interrupts off while the flash cache is disabled, so the UART interrupt
//! is simply deferred during a settings erase/program and bytes wait in the
//! 128-byte hardware FIFO (an overrun there is counted as usual).

use core::ffi::c_void;
use core::ptr;

use esp_idf_svc::sys::{self, esp};

use super::uart_regs::{uart_addresses, Mmio, UartRegs};
use super::{clock_divider, InterruptController, InterruptHandle, IsrFn, LineEvents, UartLine, WordFormat};
use crate::config::{APB_CLOCK_HZ, RX_FIFO_FULL_THRESHOLD, RX_TIMEOUT_SYMBOLS, UART_FIFO_LEN};
use crate::error::SerialError;
use crate::serial::PortDescriptor;

/// One of the three ESP32 UARTs.
pub struct EspUart {
    instance: u8,
    regs: UartRegs<Mmio>,
    ahb_fifo: usize,
    tx_pin: Option<u8>,
    rx_pin: u8,
}

impl EspUart {
    /// Line for the UART described by `descriptor`.
    ///
    /// Returns `None` if the chip has no UART with that instance index.
    pub fn new(descriptor: &PortDescriptor) -> Option<Self> {
        let addr = uart_addresses(descriptor.instance)?;

        Some(Self {
            instance: descriptor.instance,
            // SAFETY: fixed APB register block of an existing UART
            regs: UartRegs::new(unsafe { Mmio::new(addr.apb_base) }),
            ahb_fifo: addr.ahb_fifo,
            tx_pin: descriptor.tx_pin,
            rx_pin: descriptor.rx_pin,
        })
    }
}

impl UartLine for EspUart {
    fn configure(&self, baud_rate: u32, format: WordFormat) {
        // SAFETY: plain IDF calls, valid module and port numbers
        unsafe {
            sys::periph_module_enable(sys::periph_module_t_PERIPH_UART0_MODULE + self.instance as sys::periph_module_t);

            let tx = self.tx_pin.map_or(sys::UART_PIN_NO_CHANGE, i32::from);
            if let Err(e) = esp!(sys::uart_set_pin(
                self.instance as sys::uart_port_t,
                tx,
                i32::from(self.rx_pin),
                sys::UART_PIN_NO_CHANGE,
                sys::UART_PIN_NO_CHANGE,
            )) {
                log::error!("uart{}: pin setup failed: {}", self.instance, e);
            }
        }

        self.set_baud(baud_rate, self.source_clock_hz());
        self.regs.set_format(format);
        self.regs.set_rx_thresholds(RX_FIFO_FULL_THRESHOLD, RX_TIMEOUT_SYMBOLS);
    }

    fn set_baud(&self, baud_rate: u32, source_clock_hz: u32) {
        if let Some(div) = clock_divider(source_clock_hz, baud_rate) {
            self.regs.set_divider(div);
        }
    }

    fn source_clock_hz(&self) -> u32 {
        // SAFETY: reads cached clock tree state
        let hz = unsafe { sys::esp_clk_apb_freq() };
        u32::try_from(hz).ok().filter(|&hz| hz > 0).unwrap_or(APB_CLOCK_HZ)
    }

    fn enable_receive_interrupt(&self, enable: bool) {
        self.regs.enable_rx_events(enable);
    }

    #[inline(always)]
    fn take_events(&self) -> LineEvents {
        self.regs.take_events()
    }

    #[inline(always)]
    fn receive_fifo_len(&self) -> usize {
        self.regs.rx_fifo_len()
    }

    #[inline(always)]
    fn read_receive_register(&self) -> u8 {
        self.regs.read_rx()
    }

    #[inline(always)]
    fn transmit_queue_depth(&self) -> usize {
        self.regs.tx_fifo_len()
    }

    fn transmit_capacity(&self) -> usize {
        UART_FIFO_LEN
    }

    #[inline(always)]
    fn transmit_idle(&self) -> bool {
        self.regs.tx_idle()
    }

    #[inline(always)]
    fn write_transmit_register(&self, byte: u8) {
        // SAFETY: TX FIFO is written through its AHB alias
        unsafe { ptr::write_volatile(self.ahb_fifo as *mut u32, u32::from(byte)) }
    }

    fn reset(&self, tx_only: bool) {
        self.regs.reset(tx_only);
    }
}

/// IDF interrupt allocator.
pub struct EspInterrupts;

impl InterruptController for EspInterrupts {
    fn attach(&self, source: u32, isr: IsrFn, arg: *mut c_void) -> Result<InterruptHandle, SerialError> {
        let mut handle: sys::intr_handle_t = ptr::null_mut();

        // SAFETY: `arg` outlives the allocation (ports are 'static)
        esp!(unsafe { sys::esp_intr_alloc(source as i32, UART_INTR_FLAGS, Some(isr), arg, &mut handle) }).map_err(
            |e| {
                log::error!("esp_intr_alloc({}) failed: {}", source, e);
                SerialError::InterruptAttach
            },
        )?;

        Ok(InterruptHandle(handle as usize))
    }
}

/// Allocation flags for the UART interrupt: default level, not IRAM-safe.
const UART_INTR_FLAGS: i32 = if crate::config::UART_INTR_IRAM_SAFE {
    sys::ESP_INTR_FLAG_IRAM as i32
} else {
    0
};
