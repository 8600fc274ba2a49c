//! Per-event payload schemas
//!
//! Each canonical event name maps to one validator. Validators are pure
//! functions over the payload object: they check required fields, numeric
//! ranges, enumerations, string length bounds and cross-field consistency.
//! The registry is deliberately strict; anything it cannot positively
//! validate is rejected before it reaches the queue.

use super::catalog::is_canonical;
use serde_json::{Map, Value};

/// Severity levels shared by several events
pub const SEVERITIES: &[&str] = &["low", "medium", "high"];

/// Upper bound for any price field
pub const MAX_PRICE: f64 = 10_000_000.0;

type Payload = Map<String, Value>;
type Validator = fn(&Payload) -> Result<(), SchemaError>;

/// Payload schema violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Value out of range: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid length: {0}")]
    InvalidLength(&'static str),

    #[error("Field {field} has unsupported value '{value}'")]
    NotInEnum { field: &'static str, value: String },

    #[error("Inconsistent fields: {0}")]
    Inconsistent(&'static str),
}

/// Check a payload against the schema registered for `name`
pub fn validate(name: &str, payload: &Value) -> bool {
    validate_detailed(name, payload).is_ok()
}

/// Like [`validate`], but reports which rule failed
pub fn validate_detailed(name: &str, payload: &Value) -> Result<(), SchemaError> {
    if !is_canonical(name) {
        return Err(SchemaError::UnknownEvent(name.to_string()));
    }
    let object = payload.as_object().ok_or(SchemaError::NotAnObject)?;
    let validator = validator_for(name).ok_or_else(|| SchemaError::UnknownEvent(name.to_string()))?;
    validator(object)
}

fn validator_for(name: &str) -> Option<Validator> {
    let validator: Validator = match name {
        "price.quote_seen" => price_quote_seen,
        "price.anomaly_detected" => price_anomaly_detected,
        "price.crowd_submitted" => price_crowd_submitted,
        "negotiation.round_recorded" => negotiation_round_recorded,
        "hazard.zone_state_changed" => hazard_zone_state_changed,
        "sos.armed" => sos_armed,
        "sos.triggered" => sos_triggered,
        "sos.deactivated" => sos_deactivated,
        "context.update" => context_update,
        "threat.report_submitted" => threat_report_submitted,
        "threat.report_deduped" => threat_report_deduped,
        "threat.report_rate_limited" => threat_report_rate_limited,
        "threat.node_status_changed" => threat_node_status_changed,
        "nav.state_changed" => nav_state_changed,
        "nav.guidance_issued" => nav_guidance_issued,
        "nav.guidance_marked_false" => nav_guidance_marked_false,
        "nav.recovery_started" => nav_recovery_started,
        "nav.recovery_action_presented" => nav_recovery_action_presented,
        "nav.recovery_completed" => nav_recovery_completed,
        _ => return None,
    };
    Some(validator)
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

fn price_quote_seen(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "item", 1, 80)?;
    price(p, "quoted_price")?;
    let currency = required_str(p, "currency", 3, 3)?;
    if !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(SchemaError::WrongType {
            field: "currency",
            expected: "a 3-letter uppercase ISO code",
        });
    }
    Ok(())
}

fn price_anomaly_detected(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "item", 1, 80)?;
    price(p, "quoted_price")?;
    price(p, "expected_price")?;
    required_enum(p, "severity", SEVERITIES)?;
    Ok(())
}

fn price_crowd_submitted(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "item", 1, 80)?;
    let paid = price(p, "price_paid")?;
    let asking = price(p, "asking_price")?;
    if asking < paid {
        return Err(SchemaError::Inconsistent("asking_price must be >= price_paid"));
    }
    optional_str(p, "zone_id", 1, 64)?;
    Ok(())
}

fn negotiation_round_recorded(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "item", 1, 80)?;
    required_int(p, "round", 1, 50)?;
    price(p, "asking_price")?;
    price(p, "offer_price")?;
    Ok(())
}

fn hazard_zone_state_changed(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "zone_id", 1, 64)?;
    required_enum(p, "state", &["clear", "caution", "danger"])?;
    required_enum(p, "severity", SEVERITIES)?;
    Ok(())
}

fn sos_armed(p: &Payload) -> Result<(), SchemaError> {
    required_int(p, "tier", 1, 3)?;
    Ok(())
}

fn sos_triggered(p: &Payload) -> Result<(), SchemaError> {
    required_int(p, "tier", 1, 3)?;
    optional_str(p, "message", 0, 280)?;
    Ok(())
}

fn sos_deactivated(p: &Payload) -> Result<(), SchemaError> {
    required_enum(p, "reason", &["user_cancelled", "resolved", "timeout"])?;
    Ok(())
}

fn context_update(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "zone_id", 1, 64)?;
    let risk = required_number(p, "risk_score")?;
    if !(0.0..=100.0).contains(&risk) {
        return Err(SchemaError::OutOfRange("risk_score must be 0-100"));
    }
    Ok(())
}

fn threat_report_submitted(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "report_id", 1, 64)?;
    required_enum(
        p,
        "category",
        &["theft", "harassment", "scam", "violence", "other"],
    )?;
    required_enum(p, "severity", SEVERITIES)?;
    optional_str(p, "description", 0, 500)?;
    Ok(())
}

fn threat_report_deduped(p: &Payload) -> Result<(), SchemaError> {
    let report = required_str(p, "report_id", 1, 64)?;
    let original = required_str(p, "duplicate_of", 1, 64)?;
    if report == original {
        return Err(SchemaError::Inconsistent("duplicate_of must differ from report_id"));
    }
    Ok(())
}

fn threat_report_rate_limited(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "report_id", 1, 64)?;
    required_int(p, "attempts", 1, 1000)?;
    Ok(())
}

fn threat_node_status_changed(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "node_id", 1, 64)?;
    required_enum(p, "status", &["active", "stale", "retired"])?;
    Ok(())
}

fn nav_state_changed(p: &Payload) -> Result<(), SchemaError> {
    let from = required_str(p, "from_state", 1, 40)?;
    let to = required_str(p, "to_state", 1, 40)?;
    if from == to {
        return Err(SchemaError::Inconsistent("to_state must differ from from_state"));
    }
    Ok(())
}

fn nav_guidance_issued(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "guidance_id", 1, 64)?;
    required_str(p, "instruction", 1, 200)?;
    Ok(())
}

fn nav_guidance_marked_false(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "guidance_id", 1, 64)?;
    optional_str(p, "reason", 0, 200)?;
    Ok(())
}

fn nav_recovery_started(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "recovery_id", 1, 64)?;
    required_enum(p, "trigger", &["off_route", "gps_lost", "user_request"])?;
    Ok(())
}

fn nav_recovery_action_presented(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "recovery_id", 1, 64)?;
    required_str(p, "action", 1, 120)?;
    required_int(p, "step", 1, 20)?;
    Ok(())
}

fn nav_recovery_completed(p: &Payload) -> Result<(), SchemaError> {
    required_str(p, "recovery_id", 1, 64)?;
    required_enum(p, "outcome", &["recovered", "abandoned"])?;
    required_int(p, "duration_ms", 0, i64::MAX)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn field<'a>(p: &'a Payload, name: &'static str) -> Result<&'a Value, SchemaError> {
    match p.get(name) {
        None | Some(Value::Null) => Err(SchemaError::MissingField(name)),
        Some(value) => Ok(value),
    }
}

fn check_len(value: &str, name: &'static str, min: usize, max: usize) -> Result<(), SchemaError> {
    let len = value.chars().count();
    if len < min || len > max || (min > 0 && value.trim().is_empty()) {
        return Err(SchemaError::InvalidLength(name));
    }
    Ok(())
}

fn required_str<'a>(
    p: &'a Payload,
    name: &'static str,
    min: usize,
    max: usize,
) -> Result<&'a str, SchemaError> {
    let value = field(p, name)?.as_str().ok_or(SchemaError::WrongType {
        field: name,
        expected: "a string",
    })?;
    check_len(value, name, min, max)?;
    Ok(value)
}

fn optional_str<'a>(
    p: &'a Payload,
    name: &'static str,
    min: usize,
    max: usize,
) -> Result<Option<&'a str>, SchemaError> {
    match p.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_str(p, name, min, max).map(Some),
    }
}

fn required_number(p: &Payload, name: &'static str) -> Result<f64, SchemaError> {
    field(p, name)?
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or(SchemaError::WrongType {
            field: name,
            expected: "a number",
        })
}

fn price(p: &Payload, name: &'static str) -> Result<f64, SchemaError> {
    let value = required_number(p, name)?;
    if value <= 0.0 || value > MAX_PRICE {
        return Err(SchemaError::OutOfRange("prices must be > 0 and <= 10,000,000"));
    }
    Ok(value)
}

fn required_int(p: &Payload, name: &'static str, min: i64, max: i64) -> Result<i64, SchemaError> {
    let value = field(p, name)?;
    let int = value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
        .ok_or(SchemaError::WrongType {
            field: name,
            expected: "an integer",
        })?;
    if int < min || int > max {
        return Err(SchemaError::OutOfRange(name));
    }
    Ok(int)
}

fn required_enum<'a>(
    p: &'a Payload,
    name: &'static str,
    allowed: &[&str],
) -> Result<&'a str, SchemaError> {
    let value = field(p, name)?.as_str().ok_or(SchemaError::WrongType {
        field: name,
        expected: "a string",
    })?;
    if !allowed.contains(&value) {
        return Err(SchemaError::NotInEnum {
            field: name,
            value: value.to_string(),
        });
    }
    Ok(value)
}
