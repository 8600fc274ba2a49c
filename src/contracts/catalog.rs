//! Canonical event catalog
//!
//! The whitelist of event names the gate accepts and the priority class
//! each name maps to. Extending the catalog means adding both a name here
//! and a validator in [`super::schemas`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every event name the gate will admit
pub const CANONICAL_EVENTS: &[&str] = &[
    "price.quote_seen",
    "price.anomaly_detected",
    "price.crowd_submitted",
    "negotiation.round_recorded",
    "hazard.zone_state_changed",
    "sos.armed",
    "sos.triggered",
    "sos.deactivated",
    "context.update",
    "threat.report_submitted",
    "threat.report_deduped",
    "threat.report_rate_limited",
    "threat.node_status_changed",
    "nav.state_changed",
    "nav.guidance_issued",
    "nav.guidance_marked_false",
    "nav.recovery_started",
    "nav.recovery_action_presented",
    "nav.recovery_completed",
];

/// Check whether an event name is on the whitelist
pub fn is_canonical(name: &str) -> bool {
    CANONICAL_EVENTS.contains(&name)
}

/// Coarse delivery bucket controlling queue order and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// SOS lifecycle events
    SosEvent,
    /// Hazard zones and threat reports
    HazardAlert,
    /// Detected price anomalies
    PriceAnomaly,
    /// Location context and navigation state
    ContextUpdate,
    /// Everything else (quotes, crowd prices, negotiation)
    LegacyActivity,
}

impl PriorityClass {
    /// All classes, highest priority first
    pub const ALL: [PriorityClass; 5] = [
        PriorityClass::SosEvent,
        PriorityClass::HazardAlert,
        PriorityClass::PriceAnomaly,
        PriorityClass::ContextUpdate,
        PriorityClass::LegacyActivity,
    ];

    /// Derive the class from an event name prefix
    pub fn for_event(event_name: &str) -> Self {
        if event_name.starts_with("sos.") {
            PriorityClass::SosEvent
        } else if event_name.starts_with("hazard.") || event_name.starts_with("threat.") {
            PriorityClass::HazardAlert
        } else if event_name.starts_with("price.anomaly") {
            PriorityClass::PriceAnomaly
        } else if event_name.starts_with("context.") || event_name.starts_with("nav.") {
            PriorityClass::ContextUpdate
        } else {
            PriorityClass::LegacyActivity
        }
    }

    /// Classes dropped at emission time in `critical` power mode
    pub fn is_noncritical(&self) -> bool {
        matches!(
            self,
            PriorityClass::ContextUpdate | PriorityClass::LegacyActivity
        )
    }

    /// Wire/config key for this class
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::SosEvent => "sos_event",
            PriorityClass::HazardAlert => "hazard_alert",
            PriorityClass::PriceAnomaly => "price_anomaly",
            PriorityClass::ContextUpdate => "context_update",
            PriorityClass::LegacyActivity => "legacy_activity",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
