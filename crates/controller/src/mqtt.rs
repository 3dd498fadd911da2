//! MQTT topic and payload helpers.
//!
//! Outbound:  `tele/<controller_id>/snapshot`  — telemetry snapshot JSON
//!            `alert/<controller_id>/<kind>`   — notification JSON
//! Inbound:   `cmd/<controller_id>/mode`       — "auto" / "manual" / "toggle"
//!            `cmd/<controller_id>/pump`       — "ON" / "OFF" (manual mode)
//!            `cmd/<controller_id>/reset`      — any payload

use crate::decision::Mode;
use crate::notify::NotificationKind;
use crate::orchestrator::Command;

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

pub(crate) fn telemetry_topic(controller_id: &str) -> String {
    format!("tele/{controller_id}/snapshot")
}

pub(crate) fn alert_topic(controller_id: &str, kind: NotificationKind) -> String {
    format!("alert/{controller_id}/{}", kind.as_str())
}

pub(crate) fn command_subscription(controller_id: &str) -> String {
    format!("cmd/{controller_id}/+")
}

/// Extract the command verb from "cmd/<controller_id>/<verb>". Returns None
/// for foreign controller ids and malformed topics.
pub(crate) fn extract_command_verb<'a>(topic: &'a str, controller_id: &str) -> Option<&'a str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "cmd" && parts[1] == controller_id {
        Some(parts[2])
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Parse an "ON"/"OFF" payload into a bool (case-insensitive, trims whitespace).
pub(crate) fn parse_pump_command(payload: &[u8]) -> Result<bool, String> {
    let s = String::from_utf8_lossy(payload).trim().to_uppercase();
    match s.as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(format!("unknown pump command '{s}'")),
    }
}

/// Parse a mode payload: "auto", "manual", or "toggle".
pub(crate) fn parse_mode_command(payload: &[u8]) -> Result<Command, String> {
    let s = String::from_utf8_lossy(payload).trim().to_lowercase();
    match s.as_str() {
        "auto" => Ok(Command::SetMode(Mode::Auto)),
        "manual" => Ok(Command::SetMode(Mode::Manual)),
        "toggle" => Ok(Command::ToggleMode),
        _ => Err(format!("unknown mode command '{s}'")),
    }
}

/// Turn a verb + payload into a command, or an error message for the log.
pub(crate) fn parse_command(verb: &str, payload: &[u8]) -> Result<Command, String> {
    match verb {
        "mode" => parse_mode_command(payload),
        "pump" => parse_pump_command(payload).map(Command::ManualPump),
        "reset" => Ok(Command::Reset),
        other => Err(format!("unknown command verb '{other}'")),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Topics ---------------------------------------------------------------

    #[test]
    fn telemetry_topic_shape() {
        assert_eq!(telemetry_topic("garden-1"), "tele/garden-1/snapshot");
    }

    #[test]
    fn alert_topic_uses_kind_name() {
        assert_eq!(
            alert_topic("garden-1", NotificationKind::LowMoisture),
            "alert/garden-1/low-moisture"
        );
    }

    #[test]
    fn command_subscription_wildcard() {
        assert_eq!(command_subscription("garden-1"), "cmd/garden-1/+");
    }

    // -- extract_command_verb ---------------------------------------------------

    #[test]
    fn extract_verb_valid_topic() {
        assert_eq!(extract_command_verb("cmd/garden-1/pump", "garden-1"), Some("pump"));
        assert_eq!(extract_command_verb("cmd/garden-1/mode", "garden-1"), Some("mode"));
    }

    #[test]
    fn extract_verb_foreign_controller() {
        assert_eq!(extract_command_verb("cmd/other/pump", "garden-1"), None);
    }

    #[test]
    fn extract_verb_wrong_prefix() {
        assert_eq!(extract_command_verb("tele/garden-1/pump", "garden-1"), None);
    }

    #[test]
    fn extract_verb_wrong_segment_count() {
        assert_eq!(extract_command_verb("cmd/garden-1", "garden-1"), None);
        assert_eq!(extract_command_verb("cmd/garden-1/pump/extra", "garden-1"), None);
        assert_eq!(extract_command_verb("", "garden-1"), None);
    }

    // -- parse_pump_command -------------------------------------------------------

    #[test]
    fn pump_command_on_off() {
        assert_eq!(parse_pump_command(b"ON"), Ok(true));
        assert_eq!(parse_pump_command(b"OFF"), Ok(false));
    }

    #[test]
    fn pump_command_case_and_whitespace() {
        assert_eq!(parse_pump_command(b"on"), Ok(true));
        assert_eq!(parse_pump_command(b"  oFf \n"), Ok(false));
    }

    #[test]
    fn pump_command_garbage() {
        assert!(parse_pump_command(b"TOGGLE").is_err());
        assert!(parse_pump_command(b"").is_err());
    }

    // -- parse_mode_command ---------------------------------------------------------

    #[test]
    fn mode_command_variants() {
        assert_eq!(parse_mode_command(b"auto"), Ok(Command::SetMode(Mode::Auto)));
        assert_eq!(parse_mode_command(b"MANUAL"), Ok(Command::SetMode(Mode::Manual)));
        assert_eq!(parse_mode_command(b" toggle "), Ok(Command::ToggleMode));
    }

    #[test]
    fn mode_command_garbage() {
        assert!(parse_mode_command(b"off").is_err());
    }

    // -- parse_command ------------------------------------------------------------------

    #[test]
    fn full_command_dispatch() {
        assert_eq!(parse_command("pump", b"ON"), Ok(Command::ManualPump(true)));
        assert_eq!(parse_command("mode", b"auto"), Ok(Command::SetMode(Mode::Auto)));
        assert_eq!(parse_command("reset", b""), Ok(Command::Reset));
        assert!(parse_command("valve", b"ON").is_err());
    }
}
