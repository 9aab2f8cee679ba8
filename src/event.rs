use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Fields the upstream producer may send as numbers or numeric strings;
/// they are always stored as integers.
pub const NUMERIC_FIELDS: [&str; 3] = ["newLevel", "totalDonations", "unitsApproved"];

/// A normalized donor event.
///
/// Beyond `timestamp`, the payload is an open bag of producer-defined
/// fields (`id`, `donor`, `nftId`, `event`, ...). Serialization flattens
/// the bag so the wire shape stays the flat JSON object the dashboard
/// consumes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Event {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Error type for webhook payload normalization.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("webhook body must be a JSON object")]
    NotAnObject,
}

impl Event {
    /// Normalizes a raw webhook payload into an `Event`.
    ///
    /// - a `donor` sent as a single-key object is unwrapped to that key
    ///   (the upstream encodes a one-element set as a keyed map);
    /// - the known numeric fields are coerced to integers, absent or
    ///   non-numeric values becoming 0;
    /// - a numeric producer `timestamp` is honored, anything else is
    ///   replaced with `now`.
    pub fn from_webhook(body: Value, now: Timestamp) -> Result<Self, NormalizeError> {
        let Value::Object(mut fields) = body else {
            return Err(NormalizeError::NotAnObject);
        };

        if let Some(donor) = fields.get_mut("donor") {
            normalize_donor(donor);
        }

        for field in NUMERIC_FIELDS {
            let coerced = coerce_int(fields.get(field));
            fields.insert(field.to_string(), Value::from(coerced));
        }

        let timestamp = match fields.remove("timestamp") {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(now),
            _ => now,
        };

        Ok(Self { timestamp, fields })
    }

    /// The normalized donor address, if the payload carried one.
    pub fn donor(&self) -> Option<&str> {
        self.fields.get("donor").and_then(Value::as_str)
    }
}

/// Unwraps the upstream's single-key-object encoding of `donor` in place.
///
/// Strings and nulls pass through. An array or a number would mean the
/// upstream format changed again; that case is logged and left untouched
/// rather than guessed at.
fn normalize_donor(donor: &mut Value) {
    let replacement = match donor {
        Value::Object(map) => match map.keys().next() {
            Some(key) => Some(Value::String(key.clone())),
            None => Some(Value::Null),
        },
        Value::String(_) | Value::Null => None,
        ref other => {
            warn!(donor = %other, "unhandled donor shape in webhook payload");
            None
        }
    };
    if let Some(replacement) = replacement {
        *donor = replacement;
    }
}

fn coerce_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}
