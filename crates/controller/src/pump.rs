//! Pump safety governor: the single source of truth for the relay signal.
//!
//! A state machine driven by explicit deadline comparisons against a
//! monotonic clock sampled once per tick, so each step is a pure function of
//! (current state, now, intent) — unit-testable without real time passing.
//!
//! ```text
//! Idle ──[intent && cooldown over]──▶ Running ──[max runtime | !intent]──▶ Cooldown
//!  ▲                                     │                                    │
//!  │                                     └──[failsafe deadline]──▶ Failsafe   │
//!  └──────────────[one step later]◀───────────────────┘                       │
//!  ◀──────────────────────────[cooldown over]──────────────────────────────────┘
//! ```
//!
//! Guarantees: the relay is never asserted longer than `max_runtime_sec` in
//! one continuous interval, and at least `cooldown_sec` separates two Running
//! intervals — including runs cut short by the failsafe pulse.

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Pump as PumpConfig;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    Idle,
    Running,
    Cooldown,
    Failsafe,
}

// ---------------------------------------------------------------------------
// Governor
// ---------------------------------------------------------------------------

pub struct Governor {
    cfg: PumpConfig,
    state: PumpState,
    run_started_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    /// Next failsafe deadline; re-arms every interval whether or not it
    /// fired while Running.
    failsafe_at: Option<Instant>,
    /// Latched hardware-level fault (e.g. relay confirmed stuck on).
    /// Forces relay off until an external reset.
    fault_latched: bool,
}

impl Governor {
    pub fn new(cfg: &PumpConfig, now: Instant) -> Self {
        let failsafe_at = cfg
            .failsafe_enabled
            .then(|| now + cfg.failsafe_stop_interval());
        Self {
            cfg: cfg.clone(),
            state: PumpState::Idle,
            run_started_at: None,
            cooldown_until: None,
            failsafe_at,
            fault_latched: false,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn fault_latched(&self) -> bool {
        self.fault_latched
    }

    /// How long the pump has been in the current Running interval.
    pub fn run_elapsed(&self, now: Instant) -> Option<std::time::Duration> {
        match self.state {
            PumpState::Running => self.run_started_at.map(|t| now - t),
            _ => None,
        }
    }

    /// Escalate an unrecoverable actuator fault: force relay off and refuse
    /// every Running transition until `reset` is called.
    pub fn latch_fault(&mut self, reason: &str) {
        warn!(reason, "actuator fault latched — relay forced off");
        self.fault_latched = true;
        self.state = PumpState::Failsafe;
        self.run_started_at = None;
    }

    /// External reset: clear the fault latch and return to Idle with a fresh
    /// failsafe deadline. Cooldown history is dropped.
    pub fn reset(&mut self, now: Instant) {
        info!("governor reset");
        self.fault_latched = false;
        self.state = PumpState::Idle;
        self.run_started_at = None;
        self.cooldown_until = None;
        self.failsafe_at = self
            .cfg
            .failsafe_enabled
            .then(|| now + self.cfg.failsafe_stop_interval());
    }

    /// Advance one tick. Returns the relay-drive signal; no other component
    /// may assert the relay directly.
    pub fn step(&mut self, now: Instant, intent: bool) -> bool {
        if self.fault_latched {
            self.state = PumpState::Failsafe;
            return false;
        }

        // Failsafe deadline fires independently of moisture state. It only
        // forces an off pulse when the pump is actually running; either way
        // it re-arms for the next interval.
        if let Some(due) = self.failsafe_at {
            if now >= due {
                self.failsafe_at = Some(now + self.cfg.failsafe_stop_interval());
                if self.state == PumpState::Running {
                    info!("failsafe interval elapsed — forcing pump off");
                    self.enter_cooldown(now);
                    self.state = PumpState::Failsafe;
                    return false;
                }
            }
        }

        // A failsafe pulse lasts exactly one step; re-entry to Running then
        // follows the normal rules (including the cooldown armed above).
        if self.state == PumpState::Failsafe {
            self.state = PumpState::Idle;
        }

        if self.state == PumpState::Cooldown && self.cooldown_over(now) {
            self.state = PumpState::Idle;
        }

        match self.state {
            PumpState::Idle => {
                if intent && self.cooldown_over(now) {
                    info!("pump starting");
                    self.state = PumpState::Running;
                    self.run_started_at = Some(now);
                    true
                } else {
                    false
                }
            }
            PumpState::Running => {
                let started = self
                    .run_started_at
                    .expect("Running state always carries a start time");
                let elapsed = now - started;
                if elapsed >= self.cfg.max_runtime() {
                    info!(elapsed_sec = elapsed.as_secs(), "max runtime reached — pump off");
                    self.enter_cooldown(now);
                    false
                } else if !intent {
                    info!(elapsed_sec = elapsed.as_secs(), "intent cleared — pump off");
                    self.enter_cooldown(now);
                    false
                } else {
                    true
                }
            }
            // Cooldown not yet over; Failsafe handled above.
            PumpState::Cooldown | PumpState::Failsafe => false,
        }
    }

    fn cooldown_over(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| now >= until)
    }

    fn enter_cooldown(&mut self, now: Instant) {
        self.state = PumpState::Cooldown;
        self.run_started_at = None;
        self.cooldown_until = Some(now + self.cfg.cooldown());
    }
}

// ===========================================================================
// Tests
// ===========================================================================
