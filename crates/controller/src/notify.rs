//! Notification policy: decides whether an alert fires, given an edge event
//! and per-kind cooldown state. Delivery transport is the caller's problem.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::config::Notifications;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    PumpOn,
    PumpOff,
    LowMoisture,
    HighHumidity,
    TemperatureExtreme,
}

impl NotificationKind {
    /// Topic / display name.
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::PumpOn => "pump-on",
            NotificationKind::PumpOff => "pump-off",
            NotificationKind::LowMoisture => "low-moisture",
            NotificationKind::HighHumidity => "high-humidity",
            NotificationKind::TemperatureExtreme => "temperature-extreme",
        }
    }

    fn enabled(self, cfg: &Notifications) -> bool {
        match self {
            NotificationKind::PumpOn => cfg.pump_on,
            NotificationKind::PumpOff => cfg.pump_off,
            NotificationKind::LowMoisture => cfg.low_moisture,
            NotificationKind::HighHumidity => cfg.high_humidity,
            NotificationKind::TemperatureExtreme => cfg.temperature_extreme,
        }
    }
}

/// An alert cleared for delivery this tick.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Per-kind cooldown bookkeeping. Only this type mutates `last_sent_at`.
pub struct Notifier {
    last_sent: HashMap<NotificationKind, Instant>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            last_sent: HashMap::new(),
        }
    }

    /// Offer a qualifying edge event. Returns true when the alert should be
    /// delivered, and marks it sent. Disabled kinds never evaluate; events
    /// inside the cooldown window are suppressed.
    pub fn offer(&mut self, cfg: &Notifications, kind: NotificationKind, now: Instant) -> bool {
        if !kind.enabled(cfg) {
            return false;
        }
        if let Some(&last) = self.last_sent.get(&kind) {
            if now.duration_since(last) < cfg.cooldown() {
                return false;
            }
        }
        self.last_sent.insert(kind, now);
        true
    }

    /// Drop all cooldown history (external reset).
    pub fn clear(&mut self) {
        self.last_sent.clear();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
