use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::decision::Mode;
use crate::pump::PumpState;
use crate::threshold::ThresholdState;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub mode: Mode,
    pub pump_state: PumpState,
    pub pump_on: bool,
    pub sensor_fault: bool,
    pub maintenance: bool,
    pub reading: Option<LiveReading>,
    pub thresholds: Option<LiveThresholds>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct LiveReading {
    pub moisture_raw: i32,
    pub moisture_pct: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
}

#[derive(Clone, Serialize)]
pub struct LiveThresholds {
    pub adjusted_dry: i32,
    pub adjusted_wet: i32,
    pub rain_suspected: bool,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Pump,
    Alert,
    Command,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub mode: Mode,
    pub pump_state: PumpState,
    pub pump_on: bool,
    pub sensor_fault: bool,
    pub maintenance: bool,
    pub reading: Option<LiveReading>,
    pub thresholds: Option<LiveThresholds>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(maintenance: bool) -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            mode: Mode::Auto,
            pump_state: PumpState::Idle,
            pump_on: false,
            sensor_fault: false,
            maintenance,
            reading: None,
            thresholds: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record the outcome of one control tick.
    pub fn record_tick(
        &mut self,
        mode: Mode,
        pump_state: PumpState,
        pump_on: bool,
        sensor_fault: bool,
        reading: Option<LiveReading>,
        thresholds: &ThresholdState,
    ) {
        let pump_changed = pump_on != self.pump_on;

        self.mode = mode;
        self.pump_state = pump_state;
        self.pump_on = pump_on;
        self.sensor_fault = sensor_fault;
        if reading.is_some() {
            self.reading = reading;
        }
        self.thresholds = Some(LiveThresholds {
            adjusted_dry: thresholds.adjusted_dry,
            adjusted_wet: thresholds.adjusted_wet,
            rain_suspected: thresholds.rain_suspected,
        });

        if pump_changed {
            let state_str = if pump_on { "ON" } else { "OFF" };
            self.push_event(EventKind::Pump, format!("pump set {state_str}"));
        }
    }

    /// Record an alert cleared for delivery.
    pub fn record_alert(&mut self, detail: String) {
        self.push_event(EventKind::Alert, detail);
    }

    /// Record an inbound command.
    pub fn record_command(&mut self, detail: String) {
        self.push_event(EventKind::Command, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            mode: self.mode,
            pump_state: self.pump_state,
            pump_on: self.pump_on,
            sensor_fault: self.sensor_fault,
            maintenance: self.maintenance,
            reading: self.reading.clone(),
            thresholds: self.thresholds.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
