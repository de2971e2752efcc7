use esp_idf_svc::sys::{esp_sleep_get_wakeup_cause, esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER};

/// The RTC timer woke us, as opposed to power-on or a reset
pub fn woke_from_timer() -> bool {
    unsafe { esp_sleep_get_wakeup_cause() == esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER }
}

/// Arm the RTC timer and enter deep sleep; the chip reboots on wake
pub fn deep_sleep(minutes: u8) -> ! {
    let micros = u64::from(minutes) * 60 * 1_000_000;
    log::info!("Entering deep sleep for {} minutes...", minutes);
    std::thread::sleep(std::time::Duration::from_millis(500));
    unsafe {
        esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(micros);
        esp_idf_svc::sys::esp_deep_sleep_start()
    }
}
