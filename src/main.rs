//! CncSerialStream - firmware entry point
//!
//! 1. Claim the primary UART for the protocol stream
//! 2. Load persisted settings
//! 3. Poll loop: drain input lines, service real-time flags, forward
//!    interrupt-context log entries

#[cfg(target_os = "espidf")]
fn main() {
    use core::fmt::Write;

    use cnc_serial_stream::config::nvs::{EspPartitionTable, SettingsStore};
    use cnc_serial_stream::config::{BOARD_PORTS, DEFAULT_BAUD_RATE, RX_BUFFER_SIZE, SETTINGS_SIZE};
    use cnc_serial_stream::hal::esp32::{EspInterrupts, EspUart};
    use cnc_serial_stream::log_drain::forward_to_log;
    use cnc_serial_stream::realtime::ExecFlags;
    use cnc_serial_stream::ring_buffer::ASCII_CAN;
    use cnc_serial_stream::{SerialRegistry, REALTIME, RT_LOG_STREAM, VERSION};
    use esp_idf_svc::sys;

    type Registry = SerialRegistry<EspUart, RX_BUFFER_SIZE, 3>;

    sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("{}", VERSION);

    let lines = match BOARD_PORTS.map(|descriptor| EspUart::new(&descriptor).map(|line| (descriptor, line))) {
        [Some(a), Some(b), Some(c)] => [a, b, c],
        _ => {
            log::error!("board lists a UART the chip does not have");
            return;
        }
    };
    let registry: &'static Registry = Box::leak(Box::new(SerialRegistry::new(lines)));

    let primary = registry.enumerate()[0];
    let mut stream = match registry.claim(&primary, DEFAULT_BAUD_RATE, &EspInterrupts) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("no protocol stream: {}", e);
            return;
        }
    };

    let mut settings = [0u8; SETTINGS_SIZE];
    let mut store: SettingsStore<EspPartitionTable, SETTINGS_SIZE> = SettingsStore::new(EspPartitionTable);
    if store.init().and_then(|()| store.read(&mut settings)).is_err() {
        log::warn!("running on default settings");
    }

    let mut line = [0u8; 256];
    let mut len = 0;

    loop {
        while let Some(c) = stream.read() {
            match c {
                ASCII_CAN => len = 0,
                b'\r' | b'\n' => {
                    if len > 0 {
                        log::debug!("line: {}", core::str::from_utf8(&line[..len]).unwrap_or("<binary>"));
                        let _ = stream.write(b"ok\r\n");
                    }
                    len = 0;
                }
                _ if len < line.len() => {
                    line[len] = c;
                    len += 1;
                }
                _ => {}
            }
        }

        let flags = REALTIME.take();
        if flags.contains(ExecFlags::RESET) {
            stream.reset_read_buffer();
            len = 0;
            log::info!("soft reset");
        }
        if flags.contains(ExecFlags::STATUS_REPORT) {
            let s = stream.stats();
            let _ = write!(stream, "<Idle|Ov:{}|Err:{}>\r\n", s.overflowed, s.line_errors);
        }

        forward_to_log(&RT_LOG_STREAM);

        // SAFETY: plain FreeRTOS delay from task context
        unsafe { sys::vTaskDelay(1) };
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use cnc_serial_stream::config::BOARD_PORTS;

    println!("{}", cnc_serial_stream::VERSION);
    for port in &BOARD_PORTS {
        println!("uart{}: {} ({:?})", port.instance, port.name, port.effective_flags());
    }
}
