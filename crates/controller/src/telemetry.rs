//! Telemetry scheduler: buffers the latest controller snapshot every control
//! tick and decides when a cloud sync is due, on its own cadence.
//!
//! The timer resets on successful emission only. A failed emission is
//! retried on the next control tick (at most one attempt per tick) instead
//! of waiting out a full interval.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::decision::Mode;
use crate::pump::PumpState;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The cloud channel record: one key/value row per sync. Field set matches
/// the dashboard channel layout (moisture on the raw 0–1023 scale, pump
/// status and mode as 0/1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub moisture_raw: i32,
    pub moisture_pct: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pump_on: u8,
    pub pump_state: PumpState,
    pub adjusted_dry: i32,
    pub adjusted_wet: i32,
    pub mode: u8,
    pub rain_suspected: bool,
    pub maintenance: bool,
    pub sensor_fault: bool,
}

impl TelemetrySnapshot {
    pub fn mode_enum(&self) -> Option<Mode> {
        Mode::from_wire(self.mode)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct TelemetryScheduler {
    interval: Duration,
    last_sent_at: Option<Instant>,
    latest: Option<TelemetrySnapshot>,
}

impl TelemetryScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent_at: None,
            latest: None,
        }
    }

    /// Overwrite the buffered snapshot. Called every control tick; only the
    /// most recent state ever reaches the sink.
    pub fn record(&mut self, snapshot: TelemetrySnapshot) {
        self.latest = Some(snapshot);
    }

    /// Returns the snapshot to send when a sync attempt is due. Stays due
    /// across ticks until `mark_sent` confirms a successful emission.
    pub fn due(&self, now: Instant) -> Option<&TelemetrySnapshot> {
        let snapshot = self.latest.as_ref()?;
        let elapsed_ok = self
            .last_sent_at
            .map_or(true, |t| now.duration_since(t) >= self.interval);
        elapsed_ok.then_some(snapshot)
    }

    /// Confirm a successful emission; restarts the interval.
    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent_at = Some(now);
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn latest(&self) -> Option<&TelemetrySnapshot> {
        self.latest.as_ref()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(raw: i32) -> TelemetrySnapshot {
        TelemetrySnapshot {
            moisture_raw: raw,
            moisture_pct: 50.0,
            temperature_c: 25.0,
            humidity_pct: 50.0,
            pump_on: 0,
            pump_state: PumpState::Idle,
            adjusted_dry: 500,
            adjusted_wet: 300,
            mode: 0,
            rain_suspected: false,
            maintenance: false,
            sensor_fault: false,
        }
    }

    fn at(base: Instant, sec: u64) -> Instant {
        base + Duration::from_secs(sec)
    }

    // -- Due logic ------------------------------------------------------------

    #[test]
    fn nothing_due_before_first_record() {
        let sched = TelemetryScheduler::new(Duration::from_secs(60));
        assert!(sched.due(Instant::now()).is_none());
    }

    #[test]
    fn first_snapshot_is_due_immediately() {
        let base = Instant::now();
        let mut sched = TelemetryScheduler::new(Duration::from_secs(60));
        sched.record(snapshot(500));
        assert!(sched.due(at(base, 0)).is_some());
    }

    #[test]
    fn not_due_again_until_interval_elapses() {
        let base = Instant::now();
        let mut sched = TelemetryScheduler::new(Duration::from_secs(60));
        sched.record(snapshot(500));
        sched.mark_sent(at(base, 0));
        sched.record(snapshot(510));
        assert!(sched.due(at(base, 30)).is_none());
        assert!(sched.due(at(base, 59)).is_none());
        assert!(sched.due(at(base, 60)).is_some());
    }

    // -- Retry semantics ----------------------------------------------------------

    #[test]
    fn failed_emission_stays_due_next_tick() {
        let base = Instant::now();
        let mut sched = TelemetryScheduler::new(Duration::from_secs(60));
        sched.record(snapshot(500));
        // Attempt at t=0 fails: mark_sent never called.
        assert!(sched.due(at(base, 0)).is_some());
        // Next control tick (2 s later): still due — no full-interval wait.
        sched.record(snapshot(505));
        assert!(sched.due(at(base, 2)).is_some());
        // Success resets the timer from the success instant.
        sched.mark_sent(at(base, 2));
        assert!(sched.due(at(base, 61)).is_none());
        assert!(sched.due(at(base, 62)).is_some());
    }

    // -- Buffering ------------------------------------------------------------------

    #[test]
    fn buffer_keeps_only_latest_snapshot() {
        let base = Instant::now();
        let mut sched = TelemetryScheduler::new(Duration::from_secs(60));
        sched.record(snapshot(500));
        sched.record(snapshot(700));
        sched.record(snapshot(650));
        assert_eq!(sched.due(at(base, 0)).unwrap().moisture_raw, 650);
    }

    #[test]
    fn exactly_one_emission_per_interval_over_many_ticks() {
        // Control ticks every 2 s, cloud interval 60 s, all sends succeed:
        // 10 minutes of ticks should produce one send per interval.
        let base = Instant::now();
        let mut sched = TelemetryScheduler::new(Duration::from_secs(60));
        let mut sends = 0;
        for t in (0..600u64).step_by(2) {
            let now = at(base, t);
            sched.record(snapshot(500));
            if sched.due(now).is_some() {
                sched.mark_sent(now);
                sends += 1;
            }
        }
        assert_eq!(sends, 10);
    }

    // -- Serialization ----------------------------------------------------------------

    #[test]
    fn snapshot_serializes_wire_fields() {
        let json = serde_json::to_value(snapshot(850)).unwrap();
        assert_eq!(json["moisture_raw"], 850);
        assert_eq!(json["pump_on"], 0);
        assert_eq!(json["pump_state"], "idle");
        assert_eq!(json["mode"], 0);
        assert_eq!(json["adjusted_dry"], 500);
    }

    #[test]
    fn mode_enum_decodes() {
        let mut s = snapshot(500);
        s.mode = 1;
        assert_eq!(s.mode_enum(), Some(Mode::Manual));
    }
}
