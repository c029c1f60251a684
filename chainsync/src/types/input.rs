use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Where an input happened on chain.
///
/// Opaque to the engine beyond ordering and display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin {
    pub chain_id: u64,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chain {} block {} at {}",
            self.chain_id,
            self.block_number,
            self.timestamp.to_rfc3339()
        )
    }
}

/// An emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Namespaced event name, e.g. `erc20.Transfer`.
    pub name: String,
    pub origin: Origin,
    #[serde(default)]
    pub data: Value,
}

/// A contract call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputCall {
    /// Namespaced function name, e.g. `erc20.transfer`.
    pub name: String,
    pub origin: Origin,
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
}

/// Whether an input is an event or a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Event,
    Call,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Event => write!(f, "event"),
            InputKind::Call => write!(f, "call"),
        }
    }
}

/// An occurrence to process.
///
/// Deserialization tells the two kinds apart by the presence of an `inputs` field: payloads
/// carrying one are calls, all others are events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Input {
    Event(InputEvent),
    Call(InputCall),
}

impl Input {
    pub fn name(&self) -> &str {
        match self {
            Input::Event(event) => &event.name,
            Input::Call(call) => &call.name,
        }
    }

    pub fn origin(&self) -> &Origin {
        match self {
            Input::Event(event) => &event.origin,
            Input::Call(call) => &call.origin,
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            Input::Event(_) => InputKind::Event,
            Input::Call(_) => InputKind::Call,
        }
    }

    /// Returns the target a handler must be registered for to receive this input.
    pub fn target(&self) -> InputTarget {
        InputTarget::new(self.name(), self.kind())
    }
}

impl From<InputEvent> for Input {
    fn from(value: InputEvent) -> Self {
        Input::Event(value)
    }
}

impl From<InputCall> for Input {
    fn from(value: InputCall) -> Self {
        Input::Call(value)
    }
}

impl<'de> Deserialize<'de> for Input {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let is_call = value
            .as_object()
            .is_some_and(|object| object.contains_key("inputs"));

        if is_call {
            serde_json::from_value(value)
                .map(Input::Call)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Input::Event)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// A name and kind handlers subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputTarget {
    pub name: String,
    pub kind: InputKind,
}

impl InputTarget {
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for InputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}
