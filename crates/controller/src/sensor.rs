//! Sensor input boundary: one soil-moisture channel (raw 0–1023) plus a
//! digital temperature/humidity sensor, read once per control tick.
//!
//! The `sim` feature provides a stateful simulator for local development.
//! It models realistic capacitive sensor behaviour:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Per-reading electronic noise
//! - Occasional spikes (sensor flakiness)
//! - Closed-loop watering response (moisture rises while the pump runs)

use anyhow::Result;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Sample type & bus trait
// ---------------------------------------------------------------------------

/// One raw sensor sample. Immutable once captured; superseded by the next.
#[derive(Debug, Clone, Copy)]
pub struct SensorSample {
    pub moisture_raw: i32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub taken_at: Instant,
}

/// Anything that can produce a sensor sample. The control loop tolerates a
/// failed read: the tick proceeds with a sensor-fault outcome, never a crash.
pub trait SensorBus {
    fn sample(&mut self) -> Result<SensorSample>;
}

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
#[cfg(feature = "sim")]
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
#[cfg(feature = "sim")]
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Stateful simulator producing plausible moisture/temperature/humidity
/// readings on the controller's native scales.
#[cfg(feature = "sim")]
pub struct SimSensor {
    // Calibration endpoints (raw counts, from the config file)
    raw_wet: f64,
    raw_dry: f64,

    // Current "true" values; evolve each sample
    moisture_base: f64,
    temperature_c: f64,
    humidity_pct: f64,

    // Random walk parameters
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,

    // Spike parameters
    spike_prob: f32,
    spike_sigma: f64,

    // Watering response
    watering: bool,
    wet_rate: f64,
}

#[cfg(feature = "sim")]
impl SimSensor {
    /// `raw_wet` / `raw_dry` should match the calibration in the config file
    /// (typically 200 / 900 for a capacitive probe on a 10-bit ADC).
    pub fn new(raw_wet: f64, raw_dry: f64) -> Self {
        let range = raw_dry - raw_wet;
        Self {
            raw_wet,
            raw_dry,
            moisture_base: raw_wet + 0.5 * range,
            temperature_c: 24.0,
            humidity_pct: 55.0,
            drift_per_sample: range * 0.001, // slow drying
            walk_sigma: range * 0.01,
            mean_reversion: 0.01,
            noise_sigma: range * 0.005,
            spike_prob: 0.02,
            spike_sigma: range * 0.15,
            watering: false,
            wet_rate: -range * 0.02,
        }
    }

    /// Inform the simulator whether the pump relay is currently driven.
    pub fn set_watering(&mut self, active: bool) {
        self.watering = active;
    }

    fn next_moisture_raw(&mut self) -> i32 {
        let center = (self.raw_dry + self.raw_wet) / 2.0;
        let pull = self.mean_reversion * (center - self.moisture_base);
        let walk = gaussian(0.0, self.walk_sigma);
        let wet = if self.watering { self.wet_rate } else { 0.0 };

        self.moisture_base = (self.moisture_base + self.drift_per_sample + pull + walk + wet)
            .clamp(self.raw_wet - 50.0, self.raw_dry + 50.0);

        let noise = gaussian(0.0, self.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };

        (self.moisture_base + noise + spike)
            .round()
            .clamp(0.0, 1023.0) as i32
    }
}

#[cfg(feature = "sim")]
impl SensorBus for SimSensor {
    fn sample(&mut self) -> Result<SensorSample> {
        let moisture_raw = self.next_moisture_raw();

        // Temperature and humidity wander slowly and stay physically sane.
        self.temperature_c = (self.temperature_c + gaussian(0.0, 0.1)).clamp(-10.0, 50.0);
        self.humidity_pct = (self.humidity_pct + gaussian(0.0, 0.3)).clamp(0.0, 100.0);

        Ok(SensorSample {
            moisture_raw,
            temperature_c: self.temperature_c as f32,
            humidity_pct: self.humidity_pct as f32,
            taken_at: Instant::now(),
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
