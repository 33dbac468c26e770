use super::command::{NumberId, ProtocolError};
use crate::ipc::Arguments;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Typed lookups into an envelope's argument map, failing with the envelope's name attached.
pub(super) struct ArgReader<'a> {
    name: &'a str,
    arguments: &'a Arguments,
}

impl<'a> ArgReader<'a> {
    pub(super) fn new(name: &'a str, arguments: &'a Arguments) -> Self { Self { name, arguments } }

    fn missing(&self, field: &'static str) -> ProtocolError {
        ProtocolError::MissingArgument { command: self.name.to_string(), field }
    }

    fn malformed(&self, field: &'static str) -> ProtocolError {
        ProtocolError::MalformedArgument { command: self.name.to_string(), field }
    }

    pub(super) fn value(&self, field: &'static str) -> Option<&'a Value> {
        self.arguments.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, ProtocolError> {
        self.value(field).ok_or_else(|| self.missing(field))
    }

    pub(super) fn f64(&self, field: &'static str) -> Result<f64, ProtocolError> {
        self.required(field)?.as_f64().ok_or_else(|| self.malformed(field))
    }

    pub(super) fn opt_f64(&self, field: &'static str) -> Option<f64> {
        self.value(field).and_then(Value::as_f64)
    }

    pub(super) fn bool(&self, field: &'static str) -> Result<bool, ProtocolError> {
        self.required(field)?.as_bool().ok_or_else(|| self.malformed(field))
    }

    pub(super) fn str(&self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.required(field)?.as_str().ok_or_else(|| self.malformed(field))
    }

    pub(super) fn opt_str(&self, field: &'static str) -> Option<&'a str> {
        self.value(field).and_then(Value::as_str)
    }

    pub(super) fn timestamp(&self, field: &'static str) -> Result<DateTime<Utc>, ProtocolError> {
        DateTime::parse_from_rfc3339(self.str(field)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| self.malformed(field))
    }

    pub(super) fn id_list(&self, field: &'static str) -> Result<Vec<NumberId>, ProtocolError> {
        let Value::Array(items) = self.required(field)? else {
            return Err(self.malformed(field));
        };
        items.iter().map(|v| number_id(v).ok_or_else(|| self.malformed(field))).collect()
    }

    pub(super) fn id_map(&self, field: &'static str) -> Result<BTreeMap<NumberId, f64>, ProtocolError> {
        let Value::Object(map) = self.required(field)? else {
            return Err(self.malformed(field));
        };
        numbers_from_map(map).ok_or_else(|| self.malformed(field))
    }
}

/// Accepts identifiers both as JSON numbers and as their decimal text.
pub(crate) fn number_id(value: &Value) -> Option<NumberId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| NumberId::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads an identifier to angle mapping, keys being the identifiers' decimal text.
pub(crate) fn numbers_from_map(map: &Map<String, Value>) -> Option<BTreeMap<NumberId, f64>> {
    map.iter().map(|(k, v)| Some((k.trim().parse().ok()?, v.as_f64()?))).collect()
}

pub(crate) fn numbers_to_value(numbers: &BTreeMap<NumberId, f64>) -> Value {
    Value::Object(numbers.iter().map(|(id, yaw)| (id.to_string(), Value::from(*yaw))).collect())
}
