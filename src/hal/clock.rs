//! Microsecond timestamps for interrupt-context log entries.

/// Microseconds since boot.
#[cfg(target_os = "espidf")]
#[inline]
pub fn now_us() -> i64 {
    // SAFETY: esp_timer_get_time is ISR-safe
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

/// Off target there is no boot clock; entries are stamped 0.
#[cfg(not(target_os = "espidf"))]
#[inline]
pub fn now_us() -> i64 {
    0
}
