//! Threshold adjuster: computes the effective dry/wet moisture thresholds
//! from base soil-type values, current temperature and humidity.
//!
//! Weather adjustments are summed, not min/max'd — independent factors
//! compound — and only then clamped so the hysteresis gap survives any
//! combination. That ordering is load-bearing; keep it.

use crate::calib::CalibratedReading;
use crate::config::Config;

/// Minimum raw-unit gap between the adjusted dry and wet thresholds.
/// Anything narrower lets the pump chatter around a single moisture value.
pub const MIN_HYSTERESIS_GAP: i32 = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Effective thresholds for this tick, in raw units (higher = drier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdState {
    pub base_dry: i32,
    pub base_wet: i32,
    pub adjusted_dry: i32,
    pub adjusted_wet: i32,
    pub rain_suspected: bool,
}

// ---------------------------------------------------------------------------
// Adjustment
// ---------------------------------------------------------------------------

/// Recompute thresholds from the current reading. Pure; called every tick.
pub fn adjust(cfg: &Config, reading: &CalibratedReading) -> ThresholdState {
    let w = &cfg.weather;
    let (base_dry, base_wet) = cfg.thresholds.soil_type.base_thresholds();

    // Independent additive rules. No adjustment inside the optimal band.
    let mut sum = 0;
    if reading.temperature_c > w.temp_high_c {
        sum += w.temp_high_adjust;
    } else if reading.temperature_c < w.temp_low_c {
        sum += w.temp_low_adjust;
    }
    if reading.humidity_pct > w.humidity_high_pct {
        sum += w.humidity_high_adjust;
    } else if reading.humidity_pct < w.humidity_low_pct {
        sum += w.humidity_low_adjust;
    }

    let rain_suspected = reading.humidity_pct > w.rain_threshold_humidity_pct;

    // Sum first, then clamp to the sensor's valid raw range.
    let lo = cfg.calibration.soil_min_raw;
    let hi = cfg.calibration.soil_max_raw;
    let mut adjusted_dry = (base_dry + sum).clamp(lo, hi);
    let mut adjusted_wet = (base_wet + sum).clamp(lo, hi);

    // Hysteresis always wins over the weather sum. On the raw scale the
    // repair is raising the dry threshold (in moisture percent it moves
    // down); if that would leave the sensor range, pin dry and pull wet.
    if adjusted_dry - adjusted_wet < MIN_HYSTERESIS_GAP {
        adjusted_dry = adjusted_wet + MIN_HYSTERESIS_GAP;
        if adjusted_dry > hi {
            adjusted_dry = hi;
            adjusted_wet = adjusted_dry - MIN_HYSTERESIS_GAP;
        }
    }

    ThresholdState {
        base_dry,
        base_wet,
        adjusted_dry,
        adjusted_wet,
        rain_suspected,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
