//! GPIO adapters for the buzzer board.

use buzzer_core::hal::{InputLine, OutputLine};
use esp_idf_svc::hal::gpio::{
    AnyIOPin, AnyOutputPin, IOPin, Input, Level, Output, OutputPin, PinDriver, Pins, Pull,
};
use esp_idf_svc::sys::EspError;

/// A push-pull output driven by the core.
pub struct EspOutput(PinDriver<'static, AnyOutputPin, Output>);

impl EspOutput {
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::output(pin)?;
        driver.set_low()?;
        Ok(Self(driver))
    }
}

impl OutputLine for EspOutput {
    fn set_level(&mut self, high: bool) {
        // Only fails for an invalid pin, which `new` already ruled out.
        let _ = self.0.set_level(Level::from(high));
    }
}

/// An input with the internal pull-up enabled.
pub struct EspInput(PinDriver<'static, AnyIOPin, Input>);

impl EspInput {
    pub fn pulled_up(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::input(pin)?;
        driver.set_pull(Pull::Up)?;
        Ok(Self(driver))
    }
}

impl InputLine for EspInput {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Every pin the buzzer uses.
pub struct BoardPins {
    /// Module id, most significant bit first.
    pub id: Vec<EspInput>,
    /// Push button, active low.
    pub button: EspInput,
    pub status_led: EspOutput,
    pub button_led: EspOutput,
    pub transducer: EspOutput,
    /// On-board LED mirroring the raw button.
    pub pcb_led: EspOutput,
}

impl BoardPins {
    pub fn take(pins: Pins) -> Result<Self, EspError> {
        let id = [
            pins.gpio25.downgrade(),
            pins.gpio26.downgrade(),
            pins.gpio27.downgrade(),
            pins.gpio9.downgrade(),
            pins.gpio10.downgrade(),
            pins.gpio13.downgrade(),
            pins.gpio5.downgrade(),
        ]
        .into_iter()
        .map(EspInput::pulled_up)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            button: EspInput::pulled_up(pins.gpio17.downgrade())?,
            status_led: EspOutput::new(pins.gpio3.downgrade_output())?,
            button_led: EspOutput::new(pins.gpio16.downgrade_output())?,
            transducer: EspOutput::new(pins.gpio12.downgrade_output())?,
            pcb_led: EspOutput::new(pins.gpio2.downgrade_output())?,
        })
    }
}
