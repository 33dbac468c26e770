use crate::ipc::{Message, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum HealthStatus {
    #[strum(serialize = "OK")]
    Ok,
    /// Some component reported "not available"; the report is still usable.
    #[strum(serialize = "DEGRADED - One or more components not available")]
    Degraded,
    #[strum(serialize = "DOWN - Error in one or more components")]
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub reading: Value,
    pub status: HealthStatus,
}

impl ComponentHealth {
    /// `Name: reading`, a missing reading rendered as not available.
    pub fn line(&self) -> String {
        match &self.reading {
            Value::Null => format!("{}: Not available", self.name),
            Value::String(s) => format!("{}: {s}", self.name),
            other => format!("{}: {other}", self.name),
        }
    }
}

/// Health reply of one subsystem: its components in the order they were checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn new() -> Self { Self::default() }

    /// Records a reading, a `null` reading counts as not available.
    pub fn component(&mut self, name: impl Into<String>, reading: Value) -> &mut Self {
        let status = if reading.is_null() { HealthStatus::Degraded } else { HealthStatus::Ok };
        self.components.push(ComponentHealth { name: name.into(), reading, status });
        self
    }

    pub fn fault(&mut self, name: impl Into<String>, reason: impl Into<String>) -> &mut Self {
        self.components.push(ComponentHealth {
            name: name.into(),
            reading: Value::String(reason.into()),
            status: HealthStatus::Down,
        });
        self
    }

    pub fn status(&self) -> HealthStatus {
        self.components.iter().map(|c| c.status).max().unwrap_or(HealthStatus::Ok)
    }

    pub fn into_message(self) -> Message {
        let status = self.status().to_string();
        let components = self
            .components
            .into_iter()
            .map(|c| {
                serde_json::json!({ "name": c.name, "reading": c.reading, "status": c.status })
            })
            .collect::<Vec<_>>();
        Message::bare(serde_json::json!({ "components": components, "status": status }))
    }

    /// Decodes a health reply, `None` if the subsystem answered with something else.
    pub fn from_response(response: &Response) -> Option<Self> {
        let Response::Raw(Value::Object(map)) = response else { return None };
        let components = map.get("components")?.clone();
        serde_json::from_value(serde_json::json!({ "components": components })).ok()
    }

    /// One `Name: reading` line per component followed by the status line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.components.iter().map(ComponentHealth::line).collect();
        lines.push(format!("STATUS: {}", self.status()));
        lines
    }
}
