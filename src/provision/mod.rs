// src/provision/mod.rs

//! Provisioning orchestrator.
//!
//! Chains resolve → execute → classify → report into one cancellable job:
//!
//! 1. start the job clock;
//! 2. build the script parameters;
//! 3. resolve the script (by role, or by explicit name);
//! 4. run an [`ExecutionSession`], forwarding every status update to the
//!    progress sink as it happens;
//! 5. fold the [`ExecutionResult`] into a [`ProvisioningOutcome`];
//! 6. send a closing 100% update and hand the outcome to the sink.
//!
//! Every entry point returns an outcome. Resolution, load and interpreter
//! failures become failed outcomes; cancellation becomes a cancelled one.

pub mod outcome;
pub mod sink;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::{ResolveError, Result, SessionError};
use crate::fs::RealFileSystem;
use crate::interp::InterpreterPool;
use crate::params::ParameterCollection;
use crate::resolve::{Role, ScriptHandle, ScriptResolver};
use crate::session::{ExecutionResult, ExecutionSession, SessionOptions, StatusUpdate};
use crate::store::{ConfigurationStore, JsonConfigurationStore};
use crate::vm::{VmConfiguration, role_defaults};

pub use outcome::{JobState, ProvisioningOutcome};
pub use sink::{ChannelSink, ConsoleSink, FnSink, NullSink, ProgressEvent, ProgressSink};

use outcome::Job;

/// Owns the interpreter pool and runs provisioning jobs against it.
pub struct Provisioner {
    pool: InterpreterPool,
    resolver: Arc<ScriptResolver>,
    store: Arc<dyn ConfigurationStore>,
    options: SessionOptions,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("pool", &self.pool.status())
            .field("resolver", &self.resolver)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(
        pool: InterpreterPool,
        resolver: Arc<ScriptResolver>,
        store: Arc<dyn ConfigurationStore>,
        options: SessionOptions,
    ) -> Self {
        Self {
            pool,
            resolver,
            store,
            options,
        }
    }

    /// Open the pool, index the script root and use JSON files for
    /// configuration documents.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let resolver = ScriptResolver::new(
            Arc::new(RealFileSystem),
            &cfg.scripts.root,
            &cfg.scripts.extension,
        );
        resolver.index_directory(&cfg.scripts.root)?;

        let pool = InterpreterPool::open(cfg.pool.min_size, cfg.pool.max_size)?;

        Ok(Self::new(
            pool,
            Arc::new(resolver),
            Arc::new(JsonConfigurationStore::new()),
            cfg.session_options(),
        ))
    }

    pub fn pool(&self) -> &InterpreterPool {
        &self.pool
    }

    pub fn resolver(&self) -> &ScriptResolver {
        &self.resolver
    }

    pub fn store(&self) -> &dyn ConfigurationStore {
        self.store.as_ref()
    }

    /// The script a configuration would run: its explicit `script` name if
    /// set, otherwise its role's script.
    pub fn script_for(
        &self,
        config: &VmConfiguration,
    ) -> std::result::Result<ScriptHandle, ResolveError> {
        match config.script.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => self.resolver.resolve_by_name(name),
            _ => Ok(self.resolver.resolve_by_role(&config.role)),
        }
    }

    /// Parameters for role provisioning: `overrides` first, role defaults
    /// for anything left out.
    pub fn role_parameters(&self, role: &Role, overrides: ParameterCollection) -> ParameterCollection {
        let mut params = overrides;
        params.merge_defaults(&role_defaults(role));
        params
    }

    /// Provision from an in-memory configuration.
    pub async fn provision(
        &self,
        config: &VmConfiguration,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        let mut job = Job::new();
        job.start();
        self.provision_config(job, config, sink, cancel).await
    }

    /// Provision from a configuration document on storage.
    ///
    /// If the document cannot be loaded the job fails without ever
    /// acquiring an interpreter.
    pub async fn provision_from_path(
        &self,
        path: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        let mut job = Job::new();
        job.start();
        job.set_operation("Loading configuration");

        let config = match self.store.load(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!(path = ?path, error = %e, "configuration load failed");
                return fail_early(job, format!("Failed to load configuration: {e}"), sink);
            }
        };

        self.provision_config(job, &config, sink, cancel).await
    }

    /// Provision a role from a partial parameter map.
    pub async fn provision_role(
        &self,
        role: &Role,
        overrides: ParameterCollection,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        let mut job = Job::new();
        job.start();
        let params = self.role_parameters(role, overrides);
        let script = self.resolver.resolve_by_role(role);
        self.run_job(job, script, params, sink, cancel).await
    }

    /// Run an explicitly supplied script.
    pub async fn provision_script(
        &self,
        script: ScriptHandle,
        params: ParameterCollection,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        let mut job = Job::new();
        job.start();
        self.run_job(job, script, params, sink, cancel).await
    }

    /// Run an indexed script by logical name.
    pub async fn run_named(
        &self,
        name: &str,
        params: ParameterCollection,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        let mut job = Job::new();
        job.start();
        match self.resolver.resolve_by_name(name) {
            Ok(script) => self.run_job(job, script, params, sink, cancel).await,
            Err(e) => fail_early(job, format!("Failed to resolve script: {e}"), sink),
        }
    }

    /// Close the interpreter pool. Only the first call does anything.
    pub async fn shutdown(&self) -> bool {
        self.pool.close().await
    }

    async fn provision_config(
        &self,
        mut job: Job,
        config: &VmConfiguration,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        job.set_operation(format!("Preparing {}", config.name));
        let params = config.to_parameters();
        match self.script_for(config) {
            Ok(script) => self.run_job(job, script, params, sink, cancel).await,
            Err(e) => fail_early(job, format!("Failed to resolve script: {e}"), sink),
        }
    }

    async fn run_job(
        &self,
        mut job: Job,
        script: ScriptHandle,
        params: ParameterCollection,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ProvisioningOutcome {
        info!(script = %script, params = params.len(), "provisioning job started");
        job.set_script(script.name());
        job.set_operation(format!("Running {}", script.name()));

        let mut session = ExecutionSession::new(self.pool.clone(), script, params, self.options);
        let run = session
            .run(cancel, |update: &StatusUpdate| {
                sink.report(update);
                job.set_operation(update.message.clone());
            })
            .await;

        match run {
            Ok(result) => {
                let state = if result.succeeded() {
                    JobState::Succeeded
                } else {
                    JobState::Failed
                };
                let message = outcome_message(&result);
                let mut errors = result.error_messages();
                if let Some(fault) = &result.exception {
                    errors.push(fault.to_string());
                }
                close_out(job, state, message, errors, sink)
            }
            Err(SessionError::Cancelled(partial)) => close_out(
                job,
                JobState::Cancelled,
                "Provisioning was cancelled.".to_string(),
                partial.error_messages(),
                sink,
            ),
            Err(e @ SessionError::AlreadyStarted(_)) => {
                close_out(job, JobState::Failed, e.to_string(), vec![e.to_string()], sink)
            }
        }
    }
}

fn outcome_message(result: &ExecutionResult) -> String {
    if let Some(message) = result.message.as_deref().filter(|m| !m.trim().is_empty()) {
        return message.to_string();
    }
    if result.succeeded() {
        "Provisioning completed successfully.".to_string()
    } else if !result.errors.is_empty() {
        format!("Provisioning failed with {} error(s).", result.errors.len())
    } else {
        "Provisioning failed.".to_string()
    }
}

fn fail_early(job: Job, message: String, sink: &dyn ProgressSink) -> ProvisioningOutcome {
    let errors = vec![message.clone()];
    close_out(job, JobState::Failed, message, errors, sink)
}

/// Freeze the outcome and notify the sink.
///
/// Succeeded and failed jobs get a closing 100% update; a cancelled job
/// forwards nothing further, only `finish`.
fn close_out(
    job: Job,
    state: JobState,
    message: String,
    errors: Vec<String>,
    sink: &dyn ProgressSink,
) -> ProvisioningOutcome {
    debug_assert_eq!(job.state(), JobState::Running);
    if state != JobState::Cancelled {
        sink.report(&StatusUpdate::new(100, message.as_str()));
    }

    let outcome = job.finish(state, message, errors);
    info!(
        state = ?outcome.state(),
        script = outcome.script().unwrap_or("-"),
        duration_ms = outcome.duration().as_millis() as u64,
        errors = outcome.error_messages().len(),
        "provisioning job finished"
    );
    sink.finish(&outcome);
    outcome
}
