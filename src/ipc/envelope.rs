use serde_json::{Map, Value};

/// Named argument map attached to an envelope.
pub type Arguments = Map<String, Value>;

/// Builds an [`Arguments`] map from a `serde_json::json!` object literal.
///
/// Anything but an object yields an empty map.
pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

/// Payload travelling over a subsystem channel.
///
/// Commands and events are always name/argument pairs, plain replies (readiness flags,
/// health reports, measurements) are bare values.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Pair(String, Option<Arguments>),
    Bare(Value),
}

impl Message {
    pub fn pair(name: impl Into<String>, arguments: Option<Arguments>) -> Self {
        Self::Pair(name.into(), arguments)
    }

    pub fn bare(value: impl Into<Value>) -> Self { Self::Bare(value.into()) }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Pair(name, _) => Some(name),
            Self::Bare(_) => None,
        }
    }
}

/// A command as written by the orchestrator. Immutable once sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    name: String,
    arguments: Option<Arguments>,
}

impl CommandEnvelope {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), arguments: None } }

    pub fn with_args(name: impl Into<String>, arguments: Arguments) -> Self {
        Self { name: name.into(), arguments: Some(arguments) }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn arguments(&self) -> Option<&Arguments> { self.arguments.as_ref() }
}

impl From<CommandEnvelope> for Message {
    fn from(value: CommandEnvelope) -> Self { Message::Pair(value.name, value.arguments) }
}

/// Decoded reply or event read back from a subsystem channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Structured { command: String, arguments: Option<Arguments> },
    Raw(Value),
}

impl From<Message> for Response {
    fn from(value: Message) -> Self {
        match value {
            Message::Pair(command, arguments) => Response::Structured { command, arguments },
            Message::Bare(Value::Array(items)) if Self::is_pair_shaped(&items) => {
                let mut items = items.into_iter();
                let command = items.next().and_then(|v| v.as_str().map(String::from));
                let arguments = match items.next() {
                    Some(Value::Object(map)) => Some(map),
                    _ => None,
                };
                Response::Structured { command: command.unwrap_or_default(), arguments }
            }
            Message::Bare(raw) => Response::Raw(raw),
        }
    }
}

impl Response {
    fn is_pair_shaped(items: &[Value]) -> bool {
        items.len() == 2 && items[0].is_string() && (items[1].is_object() || items[1].is_null())
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            Response::Structured { command, .. } => Some(command),
            Response::Raw(_) => None,
        }
    }

    pub fn arguments(&self) -> Option<&Arguments> {
        match self {
            Response::Structured { arguments, .. } => arguments.as_ref(),
            Response::Raw(_) => None,
        }
    }

    /// The whole payload as a single value, structured replies rendered as `[name, args]`.
    pub fn raw(&self) -> Value {
        match self {
            Response::Structured { command, arguments } => Value::Array(vec![
                Value::String(command.clone()),
                arguments.clone().map_or(Value::Null, Value::Object),
            ]),
            Response::Raw(raw) => raw.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Response::Raw(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&Value> { self.arguments().and_then(|a| a.get(key)) }

    pub fn arg_f64(&self, key: &str) -> Option<f64> { self.arg(key).and_then(Value::as_f64) }
}
