//! TOML config file loading and validation: the controller's entire tunable
//! surface (calibration, thresholds, weather rules, pump safety, intervals,
//! notifications, system behaviour) loaded once at startup into an immutable
//! `Config` and passed by reference into every component.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub pump: Pump,
    #[serde(default)]
    pub intervals: Intervals,
    #[serde(default)]
    pub notifications: Notifications,
    #[serde(default)]
    pub system: System,
}

// ---------------------------------------------------------------------------
// Sensor calibration
// ---------------------------------------------------------------------------

/// Soil moisture sensor calibration on the 0–1023 raw scale.
/// `soil_min_raw` is the reading when fully submerged, `soil_max_raw` when
/// completely dry — the mapping is inverted (higher raw = drier).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub soil_min_raw: i32,
    pub soil_max_raw: i32,
    /// Margin beyond [min, max] a raw reading may stray before it is treated
    /// as a sensor fault instead of being clamped.
    pub fault_tolerance_raw: i32,
    pub temperature_offset_c: f32,
    pub humidity_offset_pct: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            soil_min_raw: 200,
            soil_max_raw: 900,
            fault_tolerance_raw: 100,
            temperature_offset_c: 0.0,
            humidity_offset_pct: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Soil / crop presets
// ---------------------------------------------------------------------------

/// Soil type carrying its base dry/wet threshold bundle (raw units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilType {
    Sandy,
    Loam,
    Clay,
}

impl SoilType {
    /// (base_dry, base_wet) raw thresholds for this soil.
    pub fn base_thresholds(self) -> (i32, i32) {
        match self {
            SoilType::Sandy => (400, 250),
            SoilType::Loam => (500, 300),
            SoilType::Clay => (600, 350),
        }
    }
}

/// How much water a crop wants, coarsely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterNeed {
    Low,
    Medium,
    High,
}

/// Crop type carrying its management-allowable-depletion percentage and
/// water-need profile. MAD informs where the base thresholds sit; it does
/// not alter run-time decisions beyond the thresholds already computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropType {
    Tomato,
    Lettuce,
    Corn,
    Cotton,
    Grass,
    Ornamental,
}

impl CropType {
    pub fn mad_pct(self) -> u8 {
        match self {
            CropType::Tomato => 50,
            CropType::Lettuce => 40,
            CropType::Corn => 60,
            CropType::Cotton => 70,
            CropType::Grass => 60,
            CropType::Ornamental => 65,
        }
    }

    pub fn water_need(self) -> WaterNeed {
        match self {
            CropType::Tomato | CropType::Lettuce => WaterNeed::High,
            CropType::Corn | CropType::Grass | CropType::Ornamental => WaterNeed::Medium,
            CropType::Cotton => WaterNeed::Low,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub soil_type: SoilType,
    pub crop: CropType,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            soil_type: SoilType::Loam,
            crop: CropType::Grass,
        }
    }
}

// ---------------------------------------------------------------------------
// Weather-based adjustment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Weather {
    pub temp_high_c: f32,
    pub temp_low_c: f32,
    pub temp_optimal_low_c: f32,
    pub temp_optimal_high_c: f32,
    /// Added to both thresholds when temperature exceeds `temp_high_c`
    /// (negative: irrigate sooner).
    pub temp_high_adjust: i32,
    /// Added when temperature falls below `temp_low_c` (positive: irrigate
    /// later).
    pub temp_low_adjust: i32,
    pub humidity_high_pct: f32,
    pub humidity_low_pct: f32,
    pub humidity_high_adjust: i32,
    pub humidity_low_adjust: i32,
    /// Humidity above this suggests rain. No precipitation sensor exists;
    /// this approximation is deliberate.
    pub rain_threshold_humidity_pct: f32,
    pub skip_irrigation_in_rain: bool,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            temp_high_c: 35.0,
            temp_low_c: 15.0,
            temp_optimal_low_c: 20.0,
            temp_optimal_high_c: 30.0,
            temp_high_adjust: -100,
            temp_low_adjust: 100,
            humidity_high_pct: 80.0,
            humidity_low_pct: 30.0,
            humidity_high_adjust: 50,
            humidity_low_adjust: -50,
            rain_threshold_humidity_pct: 85.0,
            skip_irrigation_in_rain: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pump safety
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pump {
    pub max_runtime_sec: u64,
    pub cooldown_sec: u64,
    pub failsafe_enabled: bool,
    /// While running, force the relay off every this many seconds regardless
    /// of moisture state (guards against stuck-on faults).
    pub failsafe_stop_interval_sec: u64,
    pub relay_gpio_pin: i64,
    pub relay_active_low: bool,
}

impl Default for Pump {
    fn default() -> Self {
        Self {
            max_runtime_sec: 600,
            cooldown_sec: 300,
            failsafe_enabled: true,
            failsafe_stop_interval_sec: 1800,
            relay_gpio_pin: 17,
            relay_active_low: true,
        }
    }
}

impl Pump {
    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_sec)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec)
    }

    pub fn failsafe_stop_interval(&self) -> Duration {
        Duration::from_secs(self.failsafe_stop_interval_sec)
    }
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub sensor_read_sec: u64,
    pub cloud_update_sec: u64,
    pub startup_delay_sec: u64,
    /// Upper bound on any single network publish; cloud I/O must never stall
    /// the control tick.
    pub http_timeout_sec: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            sensor_read_sec: 2,
            cloud_update_sec: 60,
            startup_delay_sec: 5,
            http_timeout_sec: 10,
        }
    }
}

impl Intervals {
    pub fn sensor_read(&self) -> Duration {
        Duration::from_secs(self.sensor_read_sec)
    }

    pub fn cloud_update(&self) -> Duration {
        Duration::from_secs(self.cloud_update_sec)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_sec)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub pump_on: bool,
    pub pump_off: bool,
    pub low_moisture: bool,
    pub high_humidity: bool,
    pub temperature_extreme: bool,
    /// Minimum spacing between two alerts of the same kind.
    pub cooldown_sec: u64,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            pump_on: true,
            pump_off: true,
            low_moisture: true,
            high_humidity: false,
            temperature_extreme: false,
            cooldown_sec: 300,
        }
    }
}

impl Notifications {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec)
    }
}

// ---------------------------------------------------------------------------
// System behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct System {
    /// Disables automatic irrigation and actuation entirely; telemetry
    /// continues.
    pub maintenance_mode: bool,
    /// Restore the persisted mode after a restart. The pump always restarts
    /// Idle regardless.
    pub auto_resume: bool,
}

impl Default for System {
    fn default() -> Self {
        Self {
            maintenance_mode: false,
            auto_resume: true,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// Raw ADC scale for the soil moisture channel (10-bit).
pub const SOIL_RAW_MAX: i32 = 1023;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config sections. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_calibration(&mut errors);
        self.validate_weather(&mut errors);
        self.validate_pump(&mut errors);
        self.validate_intervals(&mut errors);
        self.validate_notifications(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_calibration(&self, errors: &mut Vec<String>) {
        let c = &self.calibration;

        if !(0..=SOIL_RAW_MAX).contains(&c.soil_min_raw) {
            errors.push(format!(
                "calibration: soil_min_raw {} out of range [0, {SOIL_RAW_MAX}]",
                c.soil_min_raw
            ));
        }
        if !(0..=SOIL_RAW_MAX).contains(&c.soil_max_raw) {
            errors.push(format!(
                "calibration: soil_max_raw {} out of range [0, {SOIL_RAW_MAX}]",
                c.soil_max_raw
            ));
        }
        if c.soil_min_raw >= c.soil_max_raw {
            errors.push(format!(
                "calibration: soil_min_raw ({}) must be less than soil_max_raw ({}) — calibration range is zero or inverted",
                c.soil_min_raw, c.soil_max_raw
            ));
        }
        if c.fault_tolerance_raw < 0 {
            errors.push(format!(
                "calibration: fault_tolerance_raw must be non-negative, got {}",
                c.fault_tolerance_raw
            ));
        }
    }

    fn validate_weather(&self, errors: &mut Vec<String>) {
        let w = &self.weather;

        if w.temp_low_c >= w.temp_high_c {
            errors.push(format!(
                "weather: temp_low_c ({}) must be less than temp_high_c ({})",
                w.temp_low_c, w.temp_high_c
            ));
        }
        if w.temp_optimal_low_c >= w.temp_optimal_high_c {
            errors.push(format!(
                "weather: temp_optimal_low_c ({}) must be less than temp_optimal_high_c ({})",
                w.temp_optimal_low_c, w.temp_optimal_high_c
            ));
        }
        if w.temp_low_c > w.temp_optimal_low_c || w.temp_optimal_high_c > w.temp_high_c {
            errors.push(format!(
                "weather: temperature bands must nest: temp_low_c ({}) <= optimal [{}, {}] <= temp_high_c ({})",
                w.temp_low_c, w.temp_optimal_low_c, w.temp_optimal_high_c, w.temp_high_c
            ));
        }
        if w.humidity_low_pct >= w.humidity_high_pct {
            errors.push(format!(
                "weather: humidity_low_pct ({}) must be less than humidity_high_pct ({})",
                w.humidity_low_pct, w.humidity_high_pct
            ));
        }
        if !(0.0..=100.0).contains(&w.rain_threshold_humidity_pct) {
            errors.push(format!(
                "weather: rain_threshold_humidity_pct {} out of range [0, 100]",
                w.rain_threshold_humidity_pct
            ));
        }
    }

    fn validate_pump(&self, errors: &mut Vec<String>) {
        let p = &self.pump;

        if p.max_runtime_sec == 0 {
            errors.push("pump: max_runtime_sec must be positive".to_string());
        }
        if p.cooldown_sec == 0 {
            errors.push("pump: cooldown_sec must be positive".to_string());
        }
        if p.failsafe_enabled && p.failsafe_stop_interval_sec == 0 {
            errors.push(
                "pump: failsafe_stop_interval_sec must be positive when failsafe is enabled"
                    .to_string(),
            );
        }
        if !VALID_GPIO_PINS.contains(&p.relay_gpio_pin) {
            errors.push(format!(
                "pump: relay_gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                p.relay_gpio_pin
            ));
        }
    }

    fn validate_intervals(&self, errors: &mut Vec<String>) {
        let i = &self.intervals;

        if i.sensor_read_sec == 0 {
            errors.push("intervals: sensor_read_sec must be positive".to_string());
        }
        if i.cloud_update_sec == 0 {
            errors.push("intervals: cloud_update_sec must be positive".to_string());
        }
        if i.cloud_update_sec < i.sensor_read_sec {
            errors.push(format!(
                "intervals: cloud_update_sec ({}) must be at least sensor_read_sec ({})",
                i.cloud_update_sec, i.sensor_read_sec
            ));
        }
        if i.http_timeout_sec == 0 {
            errors.push("intervals: http_timeout_sec must be positive".to_string());
        }
    }

    fn validate_notifications(&self, errors: &mut Vec<String>) {
        if self.notifications.cooldown_sec == 0 {
            errors.push("notifications: cooldown_sec must be positive".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
