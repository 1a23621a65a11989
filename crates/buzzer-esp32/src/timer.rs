//! Hardware tick.
//!
//! A general purpose timer with auto-reload raises an alarm `tick_hz` times
//! per second. The alarm ISR runs [`TickHandler::on_tick`], which is
//! bounded, lock-free and never logs.

use anyhow::Result;
use buzzer_core::hal::OutputLine;
use buzzer_core::TickHandler;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::timer::{config::Config as TimerConfig, Timer, TimerDriver};
use log::info;

/// Start the tick. Keep the returned driver alive for as long as it runs.
pub fn start_tick<A, S>(
    timer: impl Peripheral<P = impl Timer> + 'static,
    tick_hz: u32,
    mut handler: TickHandler<A, S>,
) -> Result<TimerDriver<'static>>
where
    A: OutputLine + 'static,
    S: OutputLine + 'static,
{
    let mut driver = TimerDriver::new(timer, &TimerConfig::new().auto_reload(true))?;
    driver.set_counter(0)?;
    driver.set_alarm(driver.tick_hz() / u64::from(tick_hz.max(1)))?;

    // SAFETY: the handler does not block, allocate or call into FreeRTOS.
    unsafe {
        driver.subscribe(move || {
            handler.on_tick();
        })?;
    }

    driver.enable_interrupt()?;
    driver.enable_alarm(true)?;
    driver.enable(true)?;

    info!("Hardware tick running at {} Hz", tick_hz);
    Ok(driver)
}
