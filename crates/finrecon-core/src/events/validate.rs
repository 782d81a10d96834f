//! Pure validate-and-project conversion of raw records into billing events.
//!
//! Validation never throws: it returns either a typed [`BillingEvent`] or a
//! typed error list, and call sites branch explicitly. Violations come in
//! two classes:
//!
//! - **Unprocessable**: the record is not a JSON object, or cannot be typed
//!   at all (missing/unknown `event_type`, unparseable `timestamp`). These
//!   are always dropped, even when validation is skipped.
//! - **Schema**: a field violates the shape but a best-effort lenient
//!   projection exists. In skip-validation mode the lenient event is kept
//!   with its `validation_errors` populated for downstream visibility.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::types::{BillingEvent, EventType, FieldError, TenantContext};

/// Outcome of a failed record validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The record cannot be typed and is always dropped.
    Unprocessable {
        /// Field-level failures.
        errors: Vec<FieldError>,
    },
    /// The record violated the schema but a lenient projection exists.
    Schema {
        /// Field-level failures.
        errors: Vec<FieldError>,
        /// Best-effort projection, used when validation is skipped.
        lenient: Box<BillingEvent>,
    },
}

impl RecordError {
    /// The field-level failures, regardless of class.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        match self {
            Self::Unprocessable { errors } | Self::Schema { errors, .. } => errors,
        }
    }
}

/// Validates a raw record and projects it into a [`BillingEvent`].
///
/// Tenant/project scope comes from `ctx`; any tenant fields on the record
/// itself are ignored. The full original object is preserved in
/// `raw_payload`.
///
/// # Errors
///
/// Returns [`RecordError::Unprocessable`] for non-objects and records that
/// cannot be typed, [`RecordError::Schema`] for recoverable shape
/// violations.
pub fn validate_record(raw: &Value, ctx: &TenantContext) -> Result<BillingEvent, RecordError> {
    let Some(obj) = raw.as_object() else {
        return Err(RecordError::Unprocessable {
            errors: vec![FieldError::new("", "record is not a JSON object")],
        });
    };

    let mut errors = Vec::new();

    // Fields without which the event cannot be typed or ordered.
    let event_type = match obj.get("event_type").and_then(Value::as_str) {
        Some(name) => match EventType::parse(name) {
            Some(event_type) => Some(event_type),
            None => {
                errors.push(FieldError::new(
                    "event_type",
                    format!("unknown event type: {name}"),
                ));
                None
            },
        },
        None => {
            errors.push(FieldError::new(
                "event_type",
                "missing or non-string event_type",
            ));
            None
        },
    };
    let timestamp = match obj.get("timestamp").and_then(Value::as_str) {
        Some(text) => match text.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                errors.push(FieldError::new(
                    "timestamp",
                    format!("not an RFC 3339 timestamp: {text}"),
                ));
                None
            },
        },
        None => {
            errors.push(FieldError::new("timestamp", "missing or non-string timestamp"));
            None
        },
    };
    let (Some(event_type), Some(timestamp)) = (event_type, timestamp) else {
        return Err(RecordError::Unprocessable { errors });
    };

    let event_id = require_string(obj, "event_id", &mut errors);
    let customer_id = require_string(obj, "customer_id", &mut errors);
    let subscription_id = optional_string(obj, "subscription_id", &mut errors);
    let invoice_id = optional_string(obj, "invoice_id", &mut errors);
    let currency = optional_string(obj, "currency", &mut errors);
    let plan_id = optional_string(obj, "plan_id", &mut errors);
    let amount_cents = optional_amount(obj, "amount_cents", &mut errors);
    let period_start = optional_timestamp(obj, "period_start", &mut errors);
    let period_end = optional_timestamp(obj, "period_end", &mut errors);
    let metadata = optional_object(obj, "metadata", &mut errors);

    let event = BillingEvent {
        tenant_id: ctx.tenant_id.clone(),
        project_id: ctx.project_id.clone(),
        event_id,
        event_type,
        timestamp,
        customer_id,
        subscription_id,
        invoice_id,
        amount_cents,
        currency,
        plan_id,
        period_start,
        period_end,
        metadata,
        raw_payload: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    };

    if errors.is_empty() {
        Ok(event)
    } else {
        Err(RecordError::Schema {
            errors,
            lenient: Box::new(event),
        })
    }
}

fn require_string(obj: &Map<String, Value>, key: &str, errors: &mut Vec<FieldError>) -> String {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(key, "must not be empty"));
            String::new()
        },
        Some(_) => {
            errors.push(FieldError::new(key, "must be a string"));
            String::new()
        },
        None => {
            errors.push(FieldError::new(key, "missing required field"));
            String::new()
        },
    }
}

fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(key, "must be a string"));
            None
        },
    }
}

fn optional_amount(
    obj: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(cents) if cents >= 0 => Some(cents),
            Some(cents) => {
                errors.push(FieldError::new(key, format!("must be non-negative, got {cents}")));
                None
            },
            None => {
                errors.push(FieldError::new(key, "must be an integer number of cents"));
                None
            },
        },
        Some(_) => {
            errors.push(FieldError::new(key, "must be an integer number of cents"));
            None
        },
    }
}

fn optional_timestamp(
    obj: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => match text.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                errors.push(FieldError::new(
                    key,
                    format!("not an RFC 3339 timestamp: {text}"),
                ));
                None
            },
        },
        Some(_) => {
            errors.push(FieldError::new(key, "must be an RFC 3339 timestamp string"));
            None
        },
    }
}

fn optional_object(
    obj: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> BTreeMap<String, Value> {
    match obj.get(key) {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(_) => {
            errors.push(FieldError::new(key, "must be an object"));
            BTreeMap::new()
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx() -> TenantContext {
        TenantContext::new("acme", "prod")
    }

    fn valid_record() -> Value {
        json!({
            "event_id": "evt_1",
            "event_type": "subscription_created",
            "timestamp": "2024-01-01T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1",
            "amount_cents": 5000,
            "currency": "USD",
            "plan_id": "pro"
        })
    }

    #[test]
    fn accepts_valid_record_and_attaches_context() {
        let event = validate_record(&valid_record(), &ctx()).unwrap();
        assert_eq!(event.tenant_id, "acme");
        assert_eq!(event.project_id, "prod");
        assert_eq!(event.event_type, EventType::SubscriptionCreated);
        assert_eq!(event.amount_cents, Some(5000));
        assert!(event.raw_payload.contains_key("event_id"));
    }

    #[test]
    fn non_object_is_unprocessable() {
        for raw in [json!("text"), json!(42), json!(null), json!([1, 2])] {
            let err = validate_record(&raw, &ctx()).unwrap_err();
            assert!(matches!(err, RecordError::Unprocessable { .. }), "{raw}");
        }
    }

    #[test]
    fn unknown_event_type_is_unprocessable() {
        let mut raw = valid_record();
        raw["event_type"] = json!("subscription_deleted");
        let err = validate_record(&raw, &ctx()).unwrap_err();
        assert!(matches!(err, RecordError::Unprocessable { .. }));
        assert_eq!(err.errors()[0].path, "event_type");
    }

    #[test]
    fn bad_timestamp_is_unprocessable() {
        let mut raw = valid_record();
        raw["timestamp"] = json!("yesterday");
        let err = validate_record(&raw, &ctx()).unwrap_err();
        assert!(matches!(err, RecordError::Unprocessable { .. }));
    }

    #[test]
    fn missing_customer_is_schema_error_with_lenient_projection() {
        let mut raw = valid_record();
        raw.as_object_mut().unwrap().remove("customer_id");
        let err = validate_record(&raw, &ctx()).unwrap_err();
        let RecordError::Schema { errors, lenient } = err else {
            panic!("expected schema error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "customer_id");
        assert_eq!(lenient.customer_id, "");
        assert_eq!(lenient.event_id, "evt_1");
    }

    #[test]
    fn negative_amount_is_schema_error() {
        let mut raw = valid_record();
        raw["amount_cents"] = json!(-100);
        let err = validate_record(&raw, &ctx()).unwrap_err();
        let RecordError::Schema { errors, lenient } = err else {
            panic!("expected schema error");
        };
        assert_eq!(errors[0].path, "amount_cents");
        assert_eq!(lenient.amount_cents, None);
    }

    #[test]
    fn fractional_amount_is_schema_error() {
        let mut raw = valid_record();
        raw["amount_cents"] = json!(50.5);
        let err = validate_record(&raw, &ctx()).unwrap_err();
        assert!(matches!(err, RecordError::Schema { .. }));
    }

    #[test]
    fn multiple_violations_accumulate() {
        let raw = json!({
            "event_type": "invoice_paid",
            "timestamp": "2024-01-01T00:00:00Z",
            "amount_cents": "a lot",
            "metadata": []
        });
        let err = validate_record(&raw, &ctx()).unwrap_err();
        let paths: Vec<&str> = err.errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["event_id", "customer_id", "amount_cents", "metadata"]);
    }
}
