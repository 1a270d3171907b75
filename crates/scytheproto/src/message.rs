//! Request and Response shapes shared by both transports.

use crate::codec::{self, DecodeError, DecodeMode};
use crate::value::{Object, Value};

/// A message decoded fine but does not have the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Decode(#[from] DecodeError),
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    InvalidField(&'static str),
}

impl ProtocolError {
    /// See [`DecodeError::is_incomplete`].
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Decode(e) if e.is_incomplete())
    }
}

fn into_object(value: Value) -> Result<Object, ProtocolError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProtocolError::NotAnObject(other.type_name())),
    }
}

/// A command invocation sent from the controller to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Registered handler name
    pub command: String,
    /// Handler parameters (empty when omitted on the wire)
    pub params: Object,
    /// Dedup watermark for the file-polling transport; absent on the socket
    pub timestamp: Option<f64>,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Object::new(),
            timestamp: None,
        }
    }

    pub fn with_params(mut self, params: Object) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut map = Object::new();
        map.insert("command".to_string(), Value::String(self.command.clone()));
        map.insert("params".to_string(), Value::Object(self.params.clone()));
        if let Some(ts) = self.timestamp {
            map.insert("timestamp".to_string(), Value::Number(ts));
        }
        Value::Object(map)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut map = into_object(value)?;

        let command = match map.remove("command") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(ProtocolError::MissingField("command"))
            }
            Some(_) => return Err(ProtocolError::InvalidField("command")),
        };

        let params = match map.remove("params") {
            None | Some(Value::Null) => Object::new(),
            Some(Value::Object(params)) => params,
            Some(_) => return Err(ProtocolError::InvalidField("params")),
        };

        let timestamp = match map.remove("timestamp") {
            None | Some(Value::Null) => None,
            Some(Value::Number(ts)) => Some(ts),
            Some(_) => return Err(ProtocolError::InvalidField("timestamp")),
        };

        Ok(Self {
            command,
            params,
            timestamp,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.to_value())
    }

    pub fn decode(input: &[u8], mode: DecodeMode) -> Result<Self, ProtocolError> {
        Self::from_value(codec::decode_with(input, mode)?)
    }
}

/// Success or failure; exactly one is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { data: Option<Object> },
    Failure { error: String },
}

/// The host's answer to one [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub outcome: Outcome,
    /// Informational note, never a substitute for the outcome
    pub message: Option<String>,
    /// Opaque textual result (e.g. a stringified script return value)
    pub result: Option<String>,
}

impl Response {
    /// Success without data.
    pub fn ok() -> Self {
        Self {
            outcome: Outcome::Success { data: None },
            message: None,
            result: None,
        }
    }

    pub fn ok_with(data: Object) -> Self {
        Self {
            outcome: Outcome::Success { data: Some(data) },
            message: None,
            result: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failure {
                error: error.into(),
            },
            message: None,
            result: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failure { error } => Some(error),
            Outcome::Success { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&Object> {
        match &self.outcome {
            Outcome::Success { data } => data.as_ref(),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Object::new();
        match &self.outcome {
            Outcome::Success { data } => {
                map.insert("success".to_string(), Value::Bool(true));
                if let Some(data) = data {
                    map.insert("data".to_string(), Value::Object(data.clone()));
                }
            }
            Outcome::Failure { error } => {
                map.insert("success".to_string(), Value::Bool(false));
                map.insert("error".to_string(), Value::String(error.clone()));
            }
        }
        if let Some(message) = &self.message {
            map.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(result) = &self.result {
            map.insert("result".to_string(), Value::String(result.clone()));
        }
        Value::Object(map)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut map = into_object(value)?;

        let success = match map.remove("success") {
            Some(Value::Bool(b)) => b,
            None => return Err(ProtocolError::MissingField("success")),
            Some(_) => return Err(ProtocolError::InvalidField("success")),
        };

        let outcome = if success {
            match map.remove("data") {
                None | Some(Value::Null) => Outcome::Success { data: None },
                Some(Value::Object(data)) => Outcome::Success { data: Some(data) },
                Some(_) => return Err(ProtocolError::InvalidField("data")),
            }
        } else {
            match map.remove("error") {
                Some(Value::String(error)) => Outcome::Failure { error },
                None | Some(Value::Null) => return Err(ProtocolError::MissingField("error")),
                Some(_) => return Err(ProtocolError::InvalidField("error")),
            }
        };

        let message = match map.remove("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(ProtocolError::InvalidField("message")),
        };

        // Older hosts put raw return values here; keep them as text
        let result = match map.remove("result") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            outcome,
            message,
            result,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.to_value())
    }

    pub fn decode(input: &[u8], mode: DecodeMode) -> Result<Self, ProtocolError> {
        Self::from_value(codec::decode_with(input, mode)?)
    }
}
