//! Integration tests for the claimed serial stream
//!
//! Drives a simulated UART through the real interrupt path:
//! - Real-time bytes bypass the ring, the rest keeps its order
//! - Blocking writes and the refusal callback
//! - Suspend, cancel, reset and receiver disable
//! - Baud rate changes and receive-only ports

mod common;

use std::cell::{Cell, RefCell};

use cnc_serial_stream::config::{BOARD_PORTS, DEFAULT_BAUD_RATE};
use cnc_serial_stream::hal::{LineEvents, WordFormat};
use cnc_serial_stream::realtime::{is_realtime_legacy, never_realtime, BlockingCallback, RealtimeHandler, RealtimeRedirect};
use cnc_serial_stream::ring_buffer::ASCII_CAN;
use cnc_serial_stream::serial::PortDescriptor;
use cnc_serial_stream::{SerialError, SerialRegistry, SerialStream, StreamFlags};

use common::{board_registry, SimInterrupts, SimLine, TEST_RX_SIZE};

type Stream = SerialStream<'static, SimLine, TEST_RX_SIZE>;

const UART0_SOURCE: u32 = 34;
const UART2_SOURCE: u32 = 36;

thread_local! {
    static DIVERTED: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    static POLLS: Cell<u32> = const { Cell::new(0) };
}

fn record_realtime(c: u8) -> bool {
    DIVERTED.with(|d| d.borrow_mut().push(c));
    true
}

fn decline_realtime(_c: u8) -> bool {
    false
}

fn diverted() -> Vec<u8> {
    DIVERTED.with(|d| d.borrow().clone())
}

/// Gives up on the third poll.
fn patience_of_three() -> bool {
    POLLS.with(|p| {
        p.set(p.get() + 1);
        p.get() < 3
    })
}

fn open_primary() -> (Stream, SimInterrupts) {
    let registry = board_registry();
    let irq = SimInterrupts::new();
    let props = registry.enumerate()[0];
    let stream = registry.claim(&props, DEFAULT_BAUD_RATE, &irq).unwrap();
    stream.set_realtime_handler(record_realtime);
    (stream, irq)
}

fn drain(stream: &mut Stream) -> Vec<u8> {
    std::iter::from_fn(|| stream.read()).collect()
}

#[test]
fn test_realtime_byte_bypasses_ring() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    irq.raise_rx(line, UART0_SOURCE, &[b'A', b'B', 0x18, b'C']);

    assert_eq!(drain(&mut stream), b"ABC");
    assert_eq!(diverted(), [0x18]);
    assert_eq!(stream.stats().diverted, 1);
}

#[test]
fn test_declined_realtime_byte_is_queued() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    stream.set_realtime_handler(decline_realtime);
    irq.raise_rx(line, UART0_SOURCE, b"G?");

    assert_eq!(drain(&mut stream), b"G?");
    assert!(diverted().is_empty());
}

#[test]
fn test_classifier_swap() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    let previous = stream.set_classifier(is_realtime_legacy);
    irq.raise_rx(line, UART0_SOURCE, b"X!Y");
    assert_eq!(drain(&mut stream), b"XY");
    assert_eq!(diverted(), b"!");

    stream.set_classifier(never_realtime);
    irq.raise_rx(line, UART0_SOURCE, &[b'?', 0x18]);
    assert_eq!(drain(&mut stream), [b'?', 0x18]);

    stream.set_classifier(previous);
    irq.raise_rx(line, UART0_SOURCE, b"?");
    assert!(drain(&mut stream).is_empty());
}

#[test]
fn test_write_reaches_line() {
    let (stream, _irq) = open_primary();

    stream.write(b"ok\r\n").unwrap();
    stream.write_string(b"ALARM\0ignored").unwrap();

    assert_eq!(stream.port().line().sent(), b"ok\r\nALARM");
    assert_eq!(stream.tx_buffer_count(), 0);
}

#[test]
fn test_write_byte_refused_after_callback_gives_up() {
    let (stream, _irq) = open_primary();
    let line = stream.port().line();

    line.set_stuck(true);
    assert_eq!(stream.tx_buffer_count(), SimLine::TX_CAPACITY + 1);

    stream.set_blocking_callback(patience_of_three as BlockingCallback);
    assert_eq!(stream.write_byte(b'x'), Err(SerialError::Refused));
    assert_eq!(POLLS.with(Cell::get), 3);
    assert!(line.sent().is_empty());

    // A refused byte aborts the rest of a multi-byte write
    POLLS.with(|p| p.set(0));
    assert_eq!(stream.write(b"abc"), Err(SerialError::Refused));
    assert_eq!(POLLS.with(Cell::get), 3);
}

#[test]
fn test_reset_write_buffer_unsticks_line() {
    let (stream, _irq) = open_primary();
    let line = stream.port().line();

    line.set_stuck(true);
    stream.reset_write_buffer();

    assert_eq!(stream.tx_buffer_count(), 0);
    assert_eq!(line.resets().last(), Some(&true));
    stream.write_byte(b'k').unwrap();
    assert_eq!(line.sent(), b"k");
}

#[test]
fn test_ring_overflow_and_reset() {
    let (stream, irq) = open_primary();
    let line = stream.port().line();
    let usable = TEST_RX_SIZE - 1;

    let input: Vec<u8> = (0..usable as u8 + 5).map(|i| b'a' + i).collect();
    irq.raise_rx(line, UART0_SOURCE, &input);

    assert!(stream.overflow());
    assert_eq!(stream.rx_buffer_count(), usable);
    assert_eq!(stream.rx_buffer_free(), 0);
    assert_eq!(stream.stats().overflowed, 5);

    stream.reset_read_buffer();
    assert!(!stream.overflow());
    assert_eq!(stream.rx_buffer_count(), 0);
    assert_eq!(stream.rx_buffer_free(), usable);
}

#[test]
fn test_hardware_overrun_sets_overflow() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    line.latch(LineEvents::RX_FIFO_OVERFLOW | LineEvents::FRAME_ERROR);
    irq.raise_rx(line, UART0_SOURCE, b"G");

    let stats = stream.stats();
    assert_eq!(stats.fifo_overruns, 1);
    assert_eq!(stats.line_errors, 1);
    assert!(stream.overflow());
    assert_eq!(drain(&mut stream), b"G");
}

#[test]
fn test_reset_and_cancel_mask_only_while_running() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    irq.raise_rx(line, UART0_SOURCE, b"G1 X10");
    let before = line.irq_log().len();

    stream.cancel_read_buffer();
    assert_eq!(&line.irq_log()[before..], [false, true]);
    assert!(line.irq_enabled());
    assert_eq!(drain(&mut stream), [ASCII_CAN]);

    let before = line.irq_log().len();
    stream.reset_read_buffer();
    assert_eq!(&line.irq_log()[before..], [false, true]);
    assert_eq!(line.resets().last(), Some(&false));
}

#[test]
fn test_suspend_keeps_realtime_path() {
    fn is_dollar(c: u8) -> bool {
        c == b'$'
    }

    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    irq.raise_rx(line, UART0_SOURCE, b"a");
    assert!(stream.suspend_read(true), "pending input reported");
    assert!(stream.is_suspended());

    irq.raise_rx(line, UART0_SOURCE, &[b'b', 0x18]);
    assert_eq!(diverted(), [0x18]);
    assert_eq!(stream.stats().refused, 1);

    stream.set_suspend_escape(is_dollar);
    irq.raise_rx(line, UART0_SOURCE, b"$x");

    assert!(stream.suspend_read(false));
    irq.raise_rx(line, UART0_SOURCE, b"c");
    assert_eq!(drain(&mut stream), b"a$c");
}

#[test]
fn test_disable_rx_drops_everything() {
    let (mut stream, irq) = open_primary();
    let line = stream.port().line();

    stream.disable_rx(true);
    assert!(!stream.is_rx_enabled());

    // Masked: the interrupt never runs, bytes pile up in the hardware FIFO
    irq.raise_rx(line, UART0_SOURCE, &[b'n', 0x18]);
    assert!(diverted().is_empty());
    assert_eq!(stream.rx_buffer_count(), 0);

    stream.disable_rx(false);
    assert!(stream.is_rx_enabled());
    assert_eq!(line.pending_rx(), 0, "noise discarded on re-arm");

    irq.raise_rx(line, UART0_SOURCE, b"ok");
    assert_eq!(drain(&mut stream), b"ok");
}

#[test]
fn test_set_baud_rate() {
    let (stream, _irq) = open_primary();
    let line = stream.port().line();

    assert_eq!(stream.baud_rate(), DEFAULT_BAUD_RATE);
    assert_eq!(line.format(), Some(WordFormat::default()));

    stream.set_baud_rate(9600).unwrap();
    assert_eq!(stream.baud_rate(), 9600);
    assert_eq!(line.baud(), 9600);

    assert_eq!(stream.set_baud_rate(0), Err(SerialError::InvalidBaud));
    assert_eq!(stream.baud_rate(), 9600);
}

#[test]
fn test_fixed_baud_port_rejects_change() {
    let fixed = PortDescriptor {
        flags: BOARD_PORTS[0].flags - StreamFlags::CAN_SET_BAUD,
        ..BOARD_PORTS[0]
    };
    let registry: &'static SerialRegistry<SimLine, TEST_RX_SIZE, 1> =
        Box::leak(Box::new(SerialRegistry::new([(fixed, SimLine::new())])));

    let irq = SimInterrupts::new();
    let stream = registry.claim(&registry.enumerate()[0], 115_200, &irq).unwrap();

    assert_eq!(stream.set_baud_rate(9600), Err(SerialError::Unsupported));
    assert_eq!(stream.baud_rate(), 115_200);
}

#[test]
fn test_receive_only_port() {
    let registry = board_registry();
    let irq = SimInterrupts::new();

    let props = registry.enumerate()[2];
    assert!(props.flags.contains(StreamFlags::RX_ONLY));
    assert!(!props.flags.contains(StreamFlags::MODBUS_READY));

    let mut stream = registry.claim(&props, 19_200, &irq).unwrap();
    let line = stream.port().line();

    // Claimed disarmed
    assert!(!stream.is_rx_enabled());
    assert_eq!(stream.write_byte(b'x'), Err(SerialError::Unsupported));

    stream.disable_rx(false);
    irq.raise_rx(line, UART2_SOURCE, b"M3");
    assert_eq!(drain(&mut stream), b"M3");
}

#[test]
fn test_exclusive_port_round_trip() {
    let registry = board_registry();
    let irq = SimInterrupts::new();

    let props = registry.enumerate()[1];
    assert!(registry.port(1).unwrap().descriptor().exclusive);

    let mut stream = registry.claim(&props, 57_600, &irq).unwrap();
    stream.set_realtime_handler(record_realtime);
    let line = stream.port().line();

    stream.write(b"$I\n").unwrap();
    stream.set_baud_rate(230_400).unwrap();
    irq.raise_rx(line, 35, b"ok");

    assert_eq!(line.sent(), b"$I\n");
    assert_eq!(drain(&mut stream), b"ok");
}

#[test]
fn test_handler_swap_returns_previous() {
    let (stream, _irq) = open_primary();

    let previous: RealtimeHandler = stream.set_realtime_handler(decline_realtime);
    assert_eq!(previous as usize, record_realtime as usize);
    assert!(!stream.enqueue_realtime_command(0x18));

    stream.set_realtime_handler(previous);
    assert!(stream.enqueue_realtime_command(0x18));
    assert_eq!(diverted(), [0x18]);
}

#[test]
fn test_scenario_runs_on_every_instance() {
    let registry = board_registry();
    let irq = SimInterrupts::new();

    for props in registry.enumerate() {
        let mut stream = registry.claim(&props, DEFAULT_BAUD_RATE, &irq).unwrap();
        stream.set_realtime_handler(record_realtime);
        if !stream.is_rx_enabled() {
            stream.disable_rx(false);
        }

        let before = diverted().len();
        let source = stream.port().descriptor().interrupt_source;
        irq.raise_rx(stream.port().line(), source, &[b'A', b'B', 0x18, b'C']);

        assert_eq!(drain(&mut stream), b"ABC", "uart{}", props.instance);
        assert_eq!(diverted()[before..], [0x18], "uart{}", props.instance);
    }
}

#[test]
fn test_diverted_bytes_never_queued_under_stress() {
    use cnc_serial_stream::realtime::is_realtime;

    fn swallow(_c: u8) -> bool {
        true
    }

    const ROUNDS: usize = 200;

    let (mut stream, _irq) = open_primary();
    stream.set_realtime_handler(swallow);
    let port = stream.port();

    // The producer only has the port, the stream stays with the consumer
    let producer = std::thread::spawn(move || {
        for _ in 0..ROUNDS {
            for c in 0..=u8::MAX {
                port.receive_byte(c);
            }
        }
    });

    let mut received = 0;
    loop {
        match stream.read() {
            Some(c) => {
                assert!(!is_realtime(c), "diverted byte {:#04x} was queued", c);
                received += 1;
            }
            None if producer.is_finished() && stream.rx_buffer_count() == 0 => break,
            None => std::thread::yield_now(),
        }
    }
    producer.join().unwrap();

    let queued = (0..=u8::MAX).filter(|&c| !is_realtime(c)).count() * ROUNDS;
    assert_eq!(received + stream.stats().overflowed as usize, queued);
}
