//! Pump relay control via GPIO. The `gpio` feature gates the real rppal
//! driver; without it, a mock implementation tracks state in memory and logs
//! changes.

use anyhow::Result;
use tracing::info;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO relay (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct PumpRelay {
    pin: OutputPin,
    active_low: bool, // most relay boards are active-low
    on: bool,
}

#[cfg(feature = "gpio")]
impl PumpRelay {
    pub(crate) fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut pin = gpio.get(gpio_pin)?.into_output();

        // Fail-safe: ensure "OFF" at startup
        if active_low {
            pin.set_high(); // active-low relay OFF
        } else {
            pin.set_low(); // active-high relay OFF
        }

        Ok(Self {
            pin,
            active_low,
            on: false,
        })
    }

    pub(crate) fn set(&mut self, on: bool) {
        if on == self.on {
            return;
        }
        if self.active_low {
            // active-low relay: LOW = ON, HIGH = OFF
            if on {
                self.pin.set_low()
            } else {
                self.pin.set_high()
            }
        } else {
            if on {
                self.pin.set_high()
            } else {
                self.pin.set_low()
            }
        }
        self.on = on;
        info!(on, "pump relay set");
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on
    }
}

// ---------------------------------------------------------------------------
// Mock relay (development — no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct PumpRelay {
    on: bool,
}

#[cfg(not(feature = "gpio"))]
impl PumpRelay {
    pub(crate) fn new(gpio_pin: u8, _active_low: bool) -> Result<Self> {
        info!(gpio_pin, "[mock-gpio] pump relay registered (not wired)");
        Ok(Self { on: false })
    }

    pub(crate) fn set(&mut self, on: bool) {
        if on == self.on {
            return;
        }
        self.on = on;
        info!(on, "[mock-gpio] pump relay set");
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;

    #[test]
    fn relay_starts_off() {
        let relay = PumpRelay::new(17, true).unwrap();
        assert!(!relay.is_on());
    }

    #[test]
    fn relay_set_on_then_off() {
        let mut relay = PumpRelay::new(17, true).unwrap();
        relay.set(true);
        assert!(relay.is_on());
        relay.set(false);
        assert!(!relay.is_on());
    }

    #[test]
    fn redundant_set_is_a_no_op() {
        let mut relay = PumpRelay::new(17, true).unwrap();
        relay.set(false);
        assert!(!relay.is_on());
        relay.set(true);
        relay.set(true);
        assert!(relay.is_on());
    }
}
