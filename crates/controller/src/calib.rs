//! Calibration mapper: raw sensor counts to normalized, physically
//! meaningful units. Recomputed each tick; nothing here holds state.

use crate::config::Config;
use crate::sensor::SensorSample;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Normalized reading derived from one raw sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedReading {
    /// 0.0 = completely dry, 100.0 = fully wet.
    pub moisture_pct: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// A raw moisture reading too far outside the calibrated range to trust.
/// Reported upward so the decision engine can suppress irrigation — never
/// silently clamped, never a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFault {
    pub moisture_raw: i32,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Convert a raw sample into a calibrated reading.
///
/// The moisture mapping is inverted: `soil_min_raw` corresponds to fully wet
/// and `soil_max_raw` to fully dry. Raw values inside the tolerance margin
/// are clamped into [0, 100]; values beyond it are a `SensorFault`.
pub fn calibrate(cfg: &Config, sample: &SensorSample) -> Result<CalibratedReading, SensorFault> {
    let c = &cfg.calibration;
    let raw = sample.moisture_raw;

    if raw < c.soil_min_raw - c.fault_tolerance_raw || raw > c.soil_max_raw + c.fault_tolerance_raw
    {
        return Err(SensorFault { moisture_raw: raw });
    }

    let range = (c.soil_max_raw - c.soil_min_raw) as f32;
    let moisture_pct = (100.0 * (c.soil_max_raw - raw) as f32 / range).clamp(0.0, 100.0);

    Ok(CalibratedReading {
        moisture_pct,
        temperature_c: sample.temperature_c + c.temperature_offset_c,
        humidity_pct: sample.humidity_pct + c.humidity_offset_pct,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
