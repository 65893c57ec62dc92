//! Payload interpretation
//!
//! A payload is a JSON object whose `kind` (or `type`) field selects the
//! work to perform. Anything that cannot be understood is an error, so a
//! malformed job is retried and eventually dead-lettered instead of being
//! silently acknowledged.

use serde_json::{Map, Value};
use std::time::Duration;

use super::execution::ExecutionError;

const DEFAULT_SLEEP_SECS: f64 = 1.0;
const DEFAULT_ITERATIONS: u64 = 1000;
const DEFAULT_FAILURE_MESSAGE: &str = "Simulated failure";

/// Work described by a job payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Wait, then succeed
    Sleep { duration: Duration },
    /// Bounded CPU loop
    Compute { iterations: u64 },
    /// Always fails with the given message
    Fail { error_message: String },
    /// Succeeds immediately
    Default,
}

impl Payload {
    pub fn parse(value: &Value) -> Result<Self, ExecutionError> {
        let fields = value
            .as_object()
            .ok_or_else(|| malformed("payload must be a JSON object"))?;

        let kind = match fields.get("kind").or_else(|| fields.get("type")) {
            None | Some(Value::Null) => return Ok(Payload::Default),
            Some(Value::String(kind)) => kind.as_str(),
            Some(_) => return Err(malformed("payload kind must be a string")),
        };

        match kind {
            "sleep" => {
                let secs = optional_f64(fields, "duration")?.unwrap_or(DEFAULT_SLEEP_SECS);
                let duration = Duration::try_from_secs_f64(secs).map_err(|_| {
                    malformed("duration must be a non-negative number of seconds")
                })?;
                Ok(Payload::Sleep { duration })
            }
            "compute" => {
                let iterations = match fields.get("iterations") {
                    None | Some(Value::Null) => DEFAULT_ITERATIONS,
                    Some(value) => value
                        .as_u64()
                        .ok_or_else(|| malformed("iterations must be a non-negative integer"))?,
                };
                Ok(Payload::Compute { iterations })
            }
            "fail" => {
                let error_message = match fields.get("error_message") {
                    None | Some(Value::Null) => DEFAULT_FAILURE_MESSAGE.to_string(),
                    Some(Value::String(message)) => message.clone(),
                    Some(_) => return Err(malformed("error_message must be a string")),
                };
                Ok(Payload::Fail { error_message })
            }
            "default" => Ok(Payload::Default),
            other => Err(ExecutionError::UnknownKind(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Sleep { .. } => "sleep",
            Payload::Compute { .. } => "compute",
            Payload::Fail { .. } => "fail",
            Payload::Default => "default",
        }
    }
}

fn optional_f64(fields: &Map<String, Value>, name: &str) -> Result<Option<f64>, ExecutionError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| malformed(&format!("{} must be a number", name))),
    }
}

fn malformed(reason: &str) -> ExecutionError {
    ExecutionError::MalformedPayload(reason.to_string())
}
