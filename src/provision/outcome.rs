// src/provision/outcome.rs

//! Job state and the final outcome of a provisioning job.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// `NotStarted → Running → {Succeeded, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// What a caller gets back from every provisioning job.
///
/// Only built once the job reached a terminal state; read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningOutcome {
    state: JobState,
    success: bool,
    message: String,
    error_messages: Vec<String>,
    start_time: DateTime<Utc>,
    completion_time: DateTime<Utc>,
    duration: Duration,
    current_operation: String,
    script: Option<String>,
}

impl ProvisioningOutcome {
    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Cancelled
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn completion_time(&self) -> DateTime<Utc> {
        self.completion_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Last operation reported by the script (or the pipeline step).
    pub fn current_operation(&self) -> &str {
        &self.current_operation
    }

    /// Logical name of the script that ran, if resolution got that far.
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }
}

/// Mutable bookkeeping for a job while it runs.
#[derive(Debug)]
pub(crate) struct Job {
    state: JobState,
    start_time: DateTime<Utc>,
    current_operation: String,
    script: Option<String>,
}

impl Job {
    pub(crate) fn new() -> Self {
        Self {
            state: JobState::NotStarted,
            start_time: Utc::now(),
            current_operation: String::new(),
            script: None,
        }
    }

    pub(crate) fn start(&mut self) {
        debug_assert_eq!(self.state, JobState::NotStarted);
        self.state = JobState::Running;
        self.start_time = Utc::now();
        self.current_operation = "Starting".to_string();
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn set_operation(&mut self, operation: impl Into<String>) {
        self.current_operation = operation.into();
    }

    pub(crate) fn set_script(&mut self, name: impl Into<String>) {
        self.script = Some(name.into());
    }

    /// Move to `state` and freeze the outcome.
    pub(crate) fn finish(
        self,
        state: JobState,
        message: impl Into<String>,
        error_messages: Vec<String>,
    ) -> ProvisioningOutcome {
        debug_assert!(state.is_terminal());
        let completion_time = Utc::now();
        let duration = (completion_time - self.start_time)
            .to_std()
            .unwrap_or_default();

        ProvisioningOutcome {
            state,
            success: state == JobState::Succeeded,
            message: message.into(),
            error_messages,
            start_time: self.start_time,
            completion_time,
            duration,
            current_operation: self.current_operation,
            script: self.script,
        }
    }
}
