// src/session/mod.rs

//! Execution sessions.
//!
//! An [`ExecutionSession`] runs one script, once, against one interpreter
//! leased from the pool:
//!
//! - the interpreter runs on a blocking thread so the caller's task is never
//!   blocked;
//! - records stream back over a channel and are classified as they arrive,
//!   so status updates reach the caller while the script is still running;
//! - a poll ticker checks the cancellation token (and the optional timeout);
//!   when either fires the interpreter is force-stopped.
//!
//! The interpreter goes back to the pool on every path before `run` returns.

pub mod classify;
pub mod result;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::errors::{InterpreterError, PoolError, SessionError};
use crate::interp::{InterpreterPool, LuaInterpreter, Stream, StreamRecord};
use crate::params::ParameterCollection;
use crate::resolve::ScriptHandle;

pub use classify::{Classified, classify};
pub use result::{ExecutionResult, InterpreterFault, ResultRecord, StatusUpdate, record_message};

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Tuning knobs for the session driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// How often the driver checks for cancellation and timeout.
    pub poll_interval: Duration,
    /// How long to wait for a force-stopped interpreter to hand itself back
    /// before writing it off.
    pub stop_grace: Duration,
    /// Hard limit on script run time. `None` means no limit.
    pub timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stop_grace: Duration::from_secs(5),
            timeout: None,
        }
    }
}

/// How the driver loop ended.
enum Ending {
    Finished(Result<(LuaInterpreter, Result<(), InterpreterError>), JoinError>),
    Cancelled,
    TimedOut(Duration),
}

#[derive(Debug)]
pub struct ExecutionSession {
    id: u64,
    pool: InterpreterPool,
    script: ScriptHandle,
    params: ParameterCollection,
    options: SessionOptions,
    state: SessionState,
}

impl ExecutionSession {
    pub fn new(
        pool: InterpreterPool,
        script: ScriptHandle,
        params: ParameterCollection,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: SESSION_IDS.fetch_add(1, Ordering::Relaxed),
            pool,
            script,
            params,
            options,
            state: SessionState::Pending,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn script(&self) -> &ScriptHandle {
        &self.script
    }

    /// Run the script.
    ///
    /// `on_status` is called for every status update, in emission order, as
    /// soon as the record arrives. Faults are folded into the returned
    /// result; only cancellation comes back as an error, carrying the
    /// partial result.
    pub async fn run<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_status: F,
    ) -> Result<ExecutionResult, SessionError>
    where
        F: FnMut(&StatusUpdate),
    {
        if self.state != SessionState::Pending {
            return Err(SessionError::AlreadyStarted(self.state));
        }
        self.state = SessionState::Running;

        let span = info_span!("session", id = self.id, script = %self.script.name());
        let outcome = self
            .drive(cancel, &mut on_status)
            .instrument(span)
            .await;

        self.state = match &outcome {
            Ok(result) if result.succeeded() => SessionState::Succeeded,
            Ok(_) => SessionState::Failed,
            Err(_) => SessionState::Cancelled,
        };
        outcome
    }

    async fn drive<F>(
        &mut self,
        cancel: &CancellationToken,
        on_status: &mut F,
    ) -> Result<ExecutionResult, SessionError>
    where
        F: FnMut(&StatusUpdate),
    {
        let mut result = ExecutionResult::default();

        if cancel.is_cancelled() {
            info!("cancelled before start");
            return Err(cancelled(result));
        }

        let source = match load_source(&self.script).await {
            Ok(source) => source,
            Err(fault) => {
                warn!(error = %fault, "could not load script");
                result.fail_with(fault);
                return Ok(result);
            }
        };

        let mut lease = tokio::select! {
            lease = self.pool.acquire() => match lease {
                Ok(lease) => lease,
                Err(PoolError::Closed) => {
                    result.fail_with(InterpreterFault::PoolClosed);
                    return Ok(result);
                }
                Err(e) => {
                    result.fail_with(InterpreterFault::Host(e.to_string()));
                    return Ok(result);
                }
            },
            _ = cancel.cancelled() => {
                info!("cancelled while waiting for an interpreter");
                return Err(cancelled(result));
            }
        };

        let Some(mut interp) = lease.take() else {
            result.fail_with(InterpreterFault::Host("leased interpreter missing".to_string()));
            return Ok(result);
        };
        let stop = interp.stop_handle();
        info!(interp = lease.id(), "starting script");

        let (tx, mut rx) = mpsc::unbounded_channel::<StreamRecord>();
        let script_name = self.script.name().to_string();
        let params = std::mem::take(&mut self.params);
        let mut worker = tokio::task::spawn_blocking(move || {
            let outcome = interp.execute(&script_name, &source, &params, tx);
            (interp, outcome)
        });

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();
        let mut records_open = true;

        // Records are polled first so a finished worker never jumps ahead of
        // output it already queued.
        let ending = loop {
            tokio::select! {
                biased;

                record = rx.recv(), if records_open => match record {
                    Some(record) => {
                        if let Some(ending) = self.interrupted(cancel, started) {
                            absorb::<F>(record, &mut result, None);
                            break ending;
                        }
                        absorb(record, &mut result, Some(&mut *on_status));
                    }
                    None => records_open = false,
                },

                joined = &mut worker => break Ending::Finished(joined),

                _ = ticker.tick() => {
                    if let Some(ending) = self.interrupted(cancel, started) {
                        break ending;
                    }
                }
            }
        };

        match ending {
            Ending::Finished(Ok((interp, outcome))) => {
                lease.restore(interp);
                lease.release();

                while let Ok(record) = rx.try_recv() {
                    if cancel.is_cancelled() {
                        absorb::<F>(record, &mut result, None);
                    } else {
                        absorb(record, &mut result, Some(&mut *on_status));
                    }
                }

                if cancel.is_cancelled() {
                    info!("script finished after cancellation was requested");
                    return Err(cancelled(result));
                }

                match outcome {
                    Ok(()) => result.finalize(),
                    // Only pool shutdown stops an interpreter we did not stop.
                    Err(InterpreterError::Stopped) => result.fail_with(InterpreterFault::PoolClosed),
                    Err(InterpreterError::Script(msg)) => {
                        result.fail_with(InterpreterFault::Script(msg))
                    }
                }
                info!(
                    success = result.succeeded(),
                    errors = result.errors.len(),
                    status_updates = result.status_updates.len(),
                    "script finished"
                );
                Ok(result)
            }

            Ending::Finished(Err(join_err)) => {
                // The interpreter went down with its thread; the empty lease
                // writes it off.
                drop(lease);
                while let Ok(record) = rx.try_recv() {
                    absorb::<F>(record, &mut result, None);
                }
                warn!(error = %join_err, "interpreter thread failed");
                result.fail_with(InterpreterFault::Host(join_err.to_string()));
                Ok(result)
            }

            ending @ (Ending::Cancelled | Ending::TimedOut(_)) => {
                stop.stop();

                match tokio::time::timeout(self.options.stop_grace, &mut worker).await {
                    Ok(Ok((interp, _))) => lease.restore(interp),
                    Ok(Err(join_err)) => {
                        warn!(error = %join_err, "interpreter thread failed while stopping")
                    }
                    Err(_) => warn!(
                        grace = ?self.options.stop_grace,
                        "interpreter did not stop in time; abandoning it"
                    ),
                }
                lease.release();

                // Keep what the script emitted before it stopped; status
                // updates are no longer forwarded.
                while let Ok(record) = rx.try_recv() {
                    absorb::<F>(record, &mut result, None);
                }

                match ending {
                    Ending::TimedOut(limit) => {
                        warn!(timeout = ?limit, "script timed out");
                        result.fail_with(InterpreterFault::TimedOut(limit));
                        Ok(result)
                    }
                    _ => {
                        info!("script cancelled");
                        Err(cancelled(result))
                    }
                }
            }
        }
    }

    fn interrupted(&self, cancel: &CancellationToken, started: Instant) -> Option<Ending> {
        if cancel.is_cancelled() {
            return Some(Ending::Cancelled);
        }
        match self.options.timeout {
            Some(limit) if started.elapsed() >= limit => Some(Ending::TimedOut(limit)),
            _ => None,
        }
    }
}

fn cancelled(mut result: ExecutionResult) -> SessionError {
    result.success = Some(false);
    result.message = Some("Script execution was cancelled.".to_string());
    SessionError::Cancelled(Box::new(result))
}

/// Route one record into the result, classifying primary output.
///
/// Status updates are forwarded and kept only while `on_status` is given.
fn absorb<F>(record: StreamRecord, result: &mut ExecutionResult, on_status: Option<&mut F>)
where
    F: FnMut(&StatusUpdate),
{
    match record.stream {
        Stream::Output => match classify(record.value) {
            Classified::Plain(value) => result.plain_output.push(value),
            Classified::Status(update) => match on_status {
                Some(on_status) => {
                    debug!(
                        percent = update.percent_complete,
                        message = %update.message,
                        "status update"
                    );
                    on_status(&update);
                    result.status_updates.push(update);
                }
                None => debug!(percent = update.percent_complete, "status update dropped"),
            },
            Classified::Result(record) => {
                if result.has_explicit_result() {
                    debug!("script emitted more than one Result record; the last one wins");
                }
                result.apply_result_record(record);
            }
        },
        Stream::Error => result.errors.push(record.value),
        Stream::Warning => result.warnings.push(record.value),
        Stream::Information => result.information.push(record.value),
    }
}

async fn load_source(script: &ScriptHandle) -> Result<String, InterpreterFault> {
    match script {
        ScriptHandle::Inline { text, .. } => Ok(text.clone()),
        ScriptHandle::File { path, .. } => match tokio::fs::read_to_string(path).await {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(InterpreterFault::ScriptFileMissing(path.clone()))
            }
            Err(e) => Err(InterpreterFault::ScriptRead(format!("{}: {e}", path.display()))),
        },
    }
}
