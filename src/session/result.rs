// src/session/result.rs

//! Data produced by an execution session.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::errors::describe_timeout;

/// Progress reported by a script through a `StatusUpdate` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub percent_complete: u8,
    pub message: String,
}

impl StatusUpdate {
    /// Percent values above 100 are clamped.
    pub fn new(percent_complete: u8, message: impl Into<String>) -> Self {
        Self {
            percent_complete: percent_complete.min(100),
            message: message.into(),
        }
    }
}

/// The terminal `Result` record a script may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    pub success: bool,
    pub message: String,
}

/// Why the host could not run a script to completion.
///
/// Faults are captured into [`ExecutionResult::exception`] rather than
/// returned as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InterpreterFault {
    PoolClosed,
    ScriptFileMissing(PathBuf),
    ScriptRead(String),
    Script(String),
    Host(String),
    TimedOut(Duration),
}

impl fmt::Display for InterpreterFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterFault::PoolClosed => f.write_str("interpreter pool is closed"),
            InterpreterFault::ScriptFileMissing(path) => {
                write!(f, "script file not found: {}", path.display())
            }
            InterpreterFault::ScriptRead(msg) => write!(f, "failed to read script: {msg}"),
            InterpreterFault::Script(msg) => write!(f, "{msg}"),
            InterpreterFault::Host(msg) => write!(f, "interpreter host error: {msg}"),
            InterpreterFault::TimedOut(limit) => f.write_str(&describe_timeout(*limit)),
        }
    }
}

impl std::error::Error for InterpreterFault {}

/// Everything captured from one script run.
///
/// Built up while the session runs and finalized when it reaches a terminal
/// state. `success` stays `None` until then.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub plain_output: Vec<Value>,
    pub errors: Vec<Value>,
    pub warnings: Vec<Value>,
    pub information: Vec<Value>,
    pub status_updates: Vec<StatusUpdate>,
    pub exception: Option<InterpreterFault>,
    /// Set once a `Result` record has been applied; its values are final.
    #[serde(skip)]
    explicit_result: bool,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.success == Some(true)
    }

    /// Whether the script reported its own outcome through a `Result` record.
    pub fn has_explicit_result(&self) -> bool {
        self.explicit_result
    }

    pub(crate) fn apply_result_record(&mut self, record: ResultRecord) {
        self.success = Some(record.success);
        self.message = Some(record.message);
        self.explicit_result = true;
    }

    /// Resolve `success` for a run that finished without a fault.
    ///
    /// An explicit `Result` record wins; otherwise success means the error
    /// stream stayed empty.
    pub(crate) fn finalize(&mut self) {
        if !self.explicit_result {
            self.success = Some(self.errors.is_empty());
        }
    }

    /// Mark the run as failed because of `fault`.
    pub(crate) fn fail_with(&mut self, fault: InterpreterFault) {
        self.success = Some(false);
        self.message = Some(format!("Script execution failed: {fault}"));
        self.exception = Some(fault);
    }

    /// One human-readable line per error-stream record.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(record_message).collect()
    }
}

/// Render a stream record as text: strings verbatim, objects through their
/// `Message` field when they have one, anything else as compact JSON.
pub fn record_message(record: &Value) -> String {
    match record {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("message"))
            .map(|(_, v)| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| record.to_string()),
        other => other.to_string(),
    }
}
