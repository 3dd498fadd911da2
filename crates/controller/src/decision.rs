//! Irrigation decision engine: combines the moisture reading, adjusted
//! thresholds, rain detection and operating mode into a pump-intent signal.
//! The intent is advice only — the governor still applies its hard limits.

use serde::Serialize;

use crate::config::Config;
use crate::threshold::ThresholdState;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    Manual,
}

impl Mode {
    /// Wire encoding used by the cloud channel (0 = auto, 1 = manual).
    pub fn as_wire(self) -> u8 {
        match self {
            Mode::Auto => 0,
            Mode::Manual => 1,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Mode::Auto),
            1 => Some(Mode::Manual),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Compute the pump intent for this tick.
///
/// `moisture_raw` is `None` on a sensor fault, which suppresses automatic
/// irrigation. Auto mode uses raw-domain hysteresis: above `adjusted_dry`
/// means irrigate, below `adjusted_wet` means stop, and values inside the
/// band preserve `prev_intent` unchanged. Manual mode passes the commanded
/// boolean through, bypassing moisture logic but never the governor.
/// Maintenance mode forces intent false unconditionally, in every mode.
pub fn decide(
    cfg: &Config,
    mode: Mode,
    manual_on: bool,
    prev_intent: bool,
    moisture_raw: Option<i32>,
    thresholds: &ThresholdState,
) -> bool {
    if cfg.system.maintenance_mode {
        return false;
    }

    match mode {
        Mode::Manual => manual_on,
        Mode::Auto => {
            let Some(raw) = moisture_raw else {
                return false; // sensor fault: never water blind
            };
            if thresholds.rain_suspected && cfg.weather.skip_irrigation_in_rain {
                return false;
            }
            if raw > thresholds.adjusted_dry {
                true
            } else if raw < thresholds.adjusted_wet {
                false
            } else {
                prev_intent
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(dry: i32, wet: i32, rain: bool) -> ThresholdState {
        ThresholdState {
            base_dry: 500,
            base_wet: 300,
            adjusted_dry: dry,
            adjusted_wet: wet,
            rain_suspected: rain,
        }
    }

    // -- Auto mode hysteresis --------------------------------------------------

    #[test]
    fn dry_soil_triggers_intent() {
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        assert!(decide(&cfg, Mode::Auto, false, false, Some(850), &t));
    }

    #[test]
    fn wet_soil_clears_intent() {
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        assert!(!decide(&cfg, Mode::Auto, false, true, Some(150), &t));
    }

    #[test]
    fn band_preserves_prior_intent() {
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        // Between wet and dry: whatever the previous intent was, keep it.
        assert!(decide(&cfg, Mode::Auto, false, true, Some(300), &t));
        assert!(!decide(&cfg, Mode::Auto, false, false, Some(300), &t));
    }

    #[test]
    fn intent_idempotent_during_dry_excursion() {
        // While the reading stays above adjusted_dry, intent stays true —
        // it becomes true once and does not oscillate.
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        let mut intent = false;
        for raw in [850, 860, 845, 850, 855] {
            intent = decide(&cfg, Mode::Auto, false, intent, Some(raw), &t);
            assert!(intent);
        }
    }

    #[test]
    fn threshold_boundary_values_hold_prior_intent() {
        // Exactly at a threshold is inside the band, not across it.
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        assert!(!decide(&cfg, Mode::Auto, false, false, Some(400), &t));
        assert!(decide(&cfg, Mode::Auto, false, true, Some(200), &t));
    }

    // -- Rain skip -------------------------------------------------------------

    #[test]
    fn rain_suspected_forces_intent_false() {
        let cfg = Config::default(); // skip_irrigation_in_rain = true
        let t = thresholds(400, 200, true);
        assert!(!decide(&cfg, Mode::Auto, false, true, Some(850), &t));
    }

    #[test]
    fn rain_ignored_when_skip_disabled() {
        let mut cfg = Config::default();
        cfg.weather.skip_irrigation_in_rain = false;
        let t = thresholds(400, 200, true);
        assert!(decide(&cfg, Mode::Auto, false, false, Some(850), &t));
    }

    // -- Sensor fault -------------------------------------------------------------

    #[test]
    fn sensor_fault_suppresses_auto_intent() {
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        assert!(!decide(&cfg, Mode::Auto, false, true, None, &t));
    }

    #[test]
    fn sensor_fault_does_not_block_manual() {
        // Manual bypasses moisture logic entirely; the governor still limits.
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        assert!(decide(&cfg, Mode::Manual, true, false, None, &t));
    }

    // -- Manual mode ----------------------------------------------------------------

    #[test]
    fn manual_mode_passes_command_through() {
        let cfg = Config::default();
        let t = thresholds(400, 200, false);
        // Wet soil, manual on: intent follows the command.
        assert!(decide(&cfg, Mode::Manual, true, false, Some(150), &t));
        assert!(!decide(&cfg, Mode::Manual, false, true, Some(850), &t));
    }

    // -- Maintenance override ----------------------------------------------------

    #[test]
    fn maintenance_forces_false_in_every_mode() {
        let mut cfg = Config::default();
        cfg.system.maintenance_mode = true;
        let t = thresholds(400, 200, false);
        assert!(!decide(&cfg, Mode::Auto, false, true, Some(850), &t));
        assert!(!decide(&cfg, Mode::Manual, true, true, Some(850), &t));
    }

    // -- Wire encoding ------------------------------------------------------------

    #[test]
    fn mode_wire_roundtrip() {
        assert_eq!(Mode::Auto.as_wire(), 0);
        assert_eq!(Mode::Manual.as_wire(), 1);
        assert_eq!(Mode::from_wire(0), Some(Mode::Auto));
        assert_eq!(Mode::from_wire(1), Some(Mode::Manual));
        assert_eq!(Mode::from_wire(7), None);
    }
}
