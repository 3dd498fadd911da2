//! Orchestrator: one periodic control tick. Read sensors → calibrate →
//! adjust thresholds → decide intent → feed the governor → evaluate
//! notifications → buffer telemetry and report when a flush is due.
//!
//! All state lives here or in the components it owns; nothing ambient.
//! Commands arrive between ticks and are applied atomically before the next
//! tick runs.

use std::time::Instant;
use tracing::{info, warn};

use crate::calib::{calibrate, CalibratedReading};
use crate::config::Config;
use crate::decision::{decide, Mode};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::pump::{Governor, PumpState};
use crate::sensor::SensorSample;
use crate::telemetry::{TelemetryScheduler, TelemetrySnapshot};
use crate::threshold::{adjust, ThresholdState};

// ---------------------------------------------------------------------------
// Commands (manual control boundary)
// ---------------------------------------------------------------------------

/// Inbound manual commands, applied atomically between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode(Mode),
    ToggleMode,
    ManualPump(bool),
    Reset,
}

// ---------------------------------------------------------------------------
// Tick outcome
// ---------------------------------------------------------------------------

/// Everything one tick decided. The caller drives the relay, delivers the
/// notifications, and attempts the telemetry flush (confirming success back
/// via [`Controller::confirm_telemetry_sent`]).
#[derive(Debug)]
pub struct TickOutcome {
    pub relay_on: bool,
    pub pump_state: PumpState,
    pub intent: bool,
    pub sensor_fault: bool,
    pub reading: Option<CalibratedReading>,
    pub thresholds: ThresholdState,
    pub notifications: Vec<Notification>,
    /// Snapshot to push to the cloud sink this tick, if a sync is due.
    pub telemetry: Option<TelemetrySnapshot>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller {
    cfg: Config,
    mode: Mode,
    manual_on: bool,
    intent: bool,
    governor: Governor,
    notifier: Notifier,
    telemetry: TelemetryScheduler,
    actuation_allowed_at: Instant,
    // Last-known values, kept so telemetry stays meaningful across faults.
    last_reading: Option<CalibratedReading>,
    last_raw: i32,
    last_thresholds: ThresholdState,
    last_pump_state: PumpState,
}

impl Controller {
    /// `restored_mode` comes from the resume store when auto-resume is
    /// configured; the pump always starts Idle regardless of what it was
    /// doing before the restart.
    pub fn new(cfg: &Config, now: Instant, restored_mode: Option<Mode>) -> Self {
        let mode = restored_mode
            .filter(|_| cfg.system.auto_resume)
            .unwrap_or(Mode::Auto);
        let (base_dry, base_wet) = cfg.thresholds.soil_type.base_thresholds();
        Self {
            mode,
            manual_on: false,
            intent: false,
            governor: Governor::new(&cfg.pump, now),
            notifier: Notifier::new(),
            telemetry: TelemetryScheduler::new(cfg.intervals.cloud_update()),
            actuation_allowed_at: now + cfg.intervals.startup_delay(),
            last_reading: None,
            last_raw: 0,
            last_thresholds: ThresholdState {
                base_dry,
                base_wet,
                adjusted_dry: base_dry,
                adjusted_wet: base_wet,
                rain_suspected: false,
            },
            last_pump_state: PumpState::Idle,
            cfg: cfg.clone(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pump_state(&self) -> PumpState {
        self.governor.state()
    }

    /// Apply one inbound command. Called between ticks only.
    pub fn apply(&mut self, cmd: Command, now: Instant) {
        match cmd {
            Command::SetMode(mode) => {
                if self.mode != mode {
                    info!(?mode, "mode changed");
                    self.mode = mode;
                    self.manual_on = false;
                }
            }
            Command::ToggleMode => {
                let next = match self.mode {
                    Mode::Auto => Mode::Manual,
                    Mode::Manual => Mode::Auto,
                };
                self.apply(Command::SetMode(next), now);
            }
            Command::ManualPump(on) => {
                // Always latched; only consulted in manual mode, and the
                // governor's limits still apply.
                info!(on, "manual pump command");
                self.manual_on = on;
            }
            Command::Reset => {
                info!("system reset");
                self.governor.reset(now);
                self.notifier.clear();
                self.intent = false;
                self.manual_on = false;
                self.actuation_allowed_at = now + self.cfg.intervals.startup_delay();
            }
        }
    }

    /// Escalate a confirmed hardware fault (e.g. relay stuck on). Latches
    /// relay-off until a Reset command arrives.
    pub fn escalate_actuator_fault(&mut self, reason: &str) {
        self.governor.latch_fault(reason);
    }

    /// Confirm that the snapshot handed out by the last tick reached the
    /// sink; restarts the telemetry interval.
    pub fn confirm_telemetry_sent(&mut self, now: Instant) {
        self.telemetry.mark_sent(now);
    }

    /// Run one control tick. `sample` is `None` when the sensor read itself
    /// failed; the tick proceeds as a sensor fault.
    pub fn tick(&mut self, now: Instant, sample: Option<SensorSample>) -> TickOutcome {
        // ── Calibrate ────────────────────────────────────────────────
        let (reading, raw, sensor_fault) = match sample {
            Some(s) => match calibrate(&self.cfg, &s) {
                Ok(r) => (Some(r), Some(s.moisture_raw), false),
                Err(fault) => {
                    warn!(raw = fault.moisture_raw, "moisture reading out of range");
                    (None, None, true)
                }
            },
            None => {
                warn!("sensor read failed");
                (None, None, true)
            }
        };

        if let Some(r) = reading {
            self.last_reading = Some(r);
            self.last_thresholds = adjust(&self.cfg, &r);
        }
        if let Some(raw) = raw {
            self.last_raw = raw;
        }
        let thresholds = self.last_thresholds;

        // ── Decide ───────────────────────────────────────────────────
        // Maintenance mode skips decision/actuation but keeps telemetry;
        // decide() itself forces intent false under maintenance, and the
        // governor still gets stepped so a running pump shuts down cleanly.
        let startup_hold = now < self.actuation_allowed_at;
        self.intent = if startup_hold {
            false
        } else {
            decide(
                &self.cfg,
                self.mode,
                self.manual_on,
                self.intent,
                raw.filter(|_| !sensor_fault),
                &thresholds,
            )
        };

        // ── Actuate ──────────────────────────────────────────────────
        let relay_on = self.governor.step(now, self.intent);
        let pump_state = self.governor.state();

        // ── Notifications ────────────────────────────────────────────
        let notifications = self.evaluate_notifications(now, pump_state, reading, raw, &thresholds);
        self.last_pump_state = pump_state;

        // ── Telemetry ────────────────────────────────────────────────
        let report = reading.or(self.last_reading);
        self.telemetry.record(TelemetrySnapshot {
            moisture_raw: self.last_raw,
            moisture_pct: report.map_or(0.0, |r| r.moisture_pct),
            temperature_c: report.map_or(0.0, |r| r.temperature_c),
            humidity_pct: report.map_or(0.0, |r| r.humidity_pct),
            pump_on: relay_on as u8,
            pump_state,
            adjusted_dry: thresholds.adjusted_dry,
            adjusted_wet: thresholds.adjusted_wet,
            mode: self.mode.as_wire(),
            rain_suspected: thresholds.rain_suspected,
            maintenance: self.cfg.system.maintenance_mode,
            sensor_fault,
        });
        let telemetry = self.telemetry.due(now).cloned();

        TickOutcome {
            relay_on,
            pump_state,
            intent: self.intent,
            sensor_fault,
            reading,
            thresholds,
            notifications,
            telemetry,
        }
    }

    fn evaluate_notifications(
        &mut self,
        now: Instant,
        pump_state: PumpState,
        reading: Option<CalibratedReading>,
        raw: Option<i32>,
        thresholds: &ThresholdState,
    ) -> Vec<Notification> {
        let ncfg = self.cfg.notifications.clone();
        let mut out = Vec::new();

        // Pump edges.
        let was_running = self.last_pump_state == PumpState::Running;
        let is_running = pump_state == PumpState::Running;
        if is_running && !was_running && self.notifier.offer(&ncfg, NotificationKind::PumpOn, now) {
            out.push(Notification {
                kind: NotificationKind::PumpOn,
                message: "pump started".to_string(),
            });
        }
        if was_running && !is_running && self.notifier.offer(&ncfg, NotificationKind::PumpOff, now)
        {
            out.push(Notification {
                kind: NotificationKind::PumpOff,
                message: format!("pump stopped ({pump_state:?})").to_lowercase(),
            });
        }

        // Level conditions; the per-kind cooldown keeps them from spamming.
        if let Some(raw) = raw {
            if raw > thresholds.adjusted_dry
                && self.notifier.offer(&ncfg, NotificationKind::LowMoisture, now)
            {
                out.push(Notification {
                    kind: NotificationKind::LowMoisture,
                    message: format!("soil dry: raw {raw} above threshold {}", thresholds.adjusted_dry),
                });
            }
        }
        if let Some(r) = reading {
            if r.humidity_pct > self.cfg.weather.humidity_high_pct
                && self.notifier.offer(&ncfg, NotificationKind::HighHumidity, now)
            {
                out.push(Notification {
                    kind: NotificationKind::HighHumidity,
                    message: format!("humidity high: {:.0}%", r.humidity_pct),
                });
            }
            let extreme =
                r.temperature_c > self.cfg.weather.temp_high_c || r.temperature_c < self.cfg.weather.temp_low_c;
            if extreme
                && self
                    .notifier
                    .offer(&ncfg, NotificationKind::TemperatureExtreme, now)
            {
                out.push(Notification {
                    kind: NotificationKind::TemperatureExtreme,
                    message: format!("temperature extreme: {:.1} degC", r.temperature_c),
                });
            }
        }

        out
    }
}

// ===========================================================================
// Tests
// ===========================================================================


#[cfg(test)]
impl Controller {
    /// Test-only peek at the buffered snapshot.
    fn telemetry_snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.telemetry.latest()
    }
}
