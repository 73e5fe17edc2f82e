// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod interp;
pub mod logging;
pub mod params;
pub mod provision;
pub mod resolve;
pub mod session;
pub mod store;
pub mod vm;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{EngineConfig, load_or_default};
use crate::fs::RealFileSystem;
use crate::params::{ParameterCollection, names_match};
use crate::provision::{
    ConsoleSink, JobState, NullSink, ProgressSink, Provisioner, ProvisioningOutcome,
};
use crate::resolve::{ScriptHandle, ScriptResolver};
use crate::store::{ConfigurationStore, JsonConfigurationStore};

/// Exit status for a cancelled job (the shell convention for SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - script resolver and interpreter pool
/// - the provisioning job for the chosen subcommand
/// - Ctrl-C handling
///
/// Returns the process exit status: 0 on success, 1 on failure, 130 when
/// the job was cancelled.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    debug!(?cfg, "engine config loaded");

    match args.command {
        Command::Roles => {
            print_roles(&cfg, args.json)?;
            Ok(0)
        }
        Command::Scripts => {
            print_scripts(&cfg, args.json)?;
            Ok(0)
        }
        command => run_job(&cfg, command, args.json).await,
    }
}

/// What an execution subcommand asks for, once its arguments are resolved.
enum Request {
    Document(PathBuf),
    Role(crate::resolve::Role, ParameterCollection),
    Named(String, ParameterCollection),
    File(PathBuf, ParameterCollection),
}

async fn run_job(cfg: &EngineConfig, command: Command, json: bool) -> Result<i32> {
    let (request, dry_run) = match command {
        Command::Provision { path, dry_run } => (Request::Document(path), dry_run),
        Command::Role {
            role,
            params,
            dry_run,
        } => (Request::Role(role, params.into_iter().collect()), dry_run),
        Command::Script {
            name,
            file,
            params,
            dry_run,
        } => {
            let params = params.into_iter().collect();
            match (file, name) {
                (Some(path), _) => (Request::File(path, params), dry_run),
                (None, Some(name)) => (Request::Named(name, params), dry_run),
                (None, None) => anyhow::bail!("either a script name or --file is required"),
            }
        }
        Command::Roles | Command::Scripts => anyhow::bail!("not an execution subcommand"),
    };

    let provisioner =
        Provisioner::from_config(cfg).context("failed to start the provisioning engine")?;

    if dry_run {
        let plan = plan(&provisioner, request).await;
        provisioner.shutdown().await;
        let (script, params) = plan?;
        print_dry_run(&script, &params, json)?;
        return Ok(0);
    }

    // Ctrl-C → cancel the running job.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; cancelling");
            cancel.cancel();
        });
    }

    let sink: Box<dyn ProgressSink> = if json {
        Box::new(NullSink)
    } else {
        Box::new(ConsoleSink)
    };
    let sink = sink.as_ref();

    let outcome = match request {
        Request::Document(path) => provisioner.provision_from_path(&path, sink, &cancel).await,
        Request::Role(role, overrides) => {
            provisioner
                .provision_role(&role, overrides, sink, &cancel)
                .await
        }
        Request::Named(name, params) => provisioner.run_named(&name, params, sink, &cancel).await,
        Request::File(path, params) => {
            provisioner
                .provision_script(ScriptHandle::file(path), params, sink, &cancel)
                .await
        }
    };
    provisioner.shutdown().await;

    print_outcome(&outcome, json)?;
    Ok(exit_code(&outcome))
}

pub fn exit_code(outcome: &ProvisioningOutcome) -> i32 {
    match outcome.state() {
        JobState::Succeeded => 0,
        JobState::Cancelled => EXIT_CANCELLED,
        _ => 1,
    }
}

/// The script and parameters a job would run with.
async fn plan(
    provisioner: &Provisioner,
    request: Request,
) -> Result<(ScriptHandle, ParameterCollection)> {
    Ok(match request {
        Request::Document(path) => {
            let config = JsonConfigurationStore::new()
                .load(&path)
                .await
                .with_context(|| format!("failed to load {}", path.display()))?;
            let script = provisioner.script_for(&config)?;
            (script, config.to_parameters())
        }
        Request::Role(role, overrides) => (
            provisioner.resolver().resolve_by_role(&role),
            provisioner.role_parameters(&role, overrides),
        ),
        Request::Named(name, params) => (provisioner.resolver().resolve_by_name(&name)?, params),
        Request::File(path, params) => (ScriptHandle::file(path), params),
    })
}

fn display_value(name: &str, value: &crate::params::ParamValue) -> String {
    if names_match(name, "AdminPassword") {
        "********".to_string()
    } else {
        value.to_string()
    }
}

fn print_dry_run(script: &ScriptHandle, params: &ParameterCollection, json: bool) -> Result<()> {
    if json {
        let parameters: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(name, value)| {
                let shown = serde_json::Value::String(display_value(name, value));
                (name.to_string(), shown)
            })
            .collect();
        let doc = serde_json::json!({
            "script": script.name(),
            "path": script.path(),
            "parameters": parameters,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("vmprov dry-run");
    println!("  script: {script}");
    println!();
    println!("parameters ({}):", params.len());
    for (name, value) in params.iter() {
        println!("  {name} = {} ({})", display_value(name, value), value.kind());
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_outcome(outcome: &ProvisioningOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let label = match outcome.state() {
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
        JobState::NotStarted | JobState::Running => "unfinished",
    };
    println!();
    println!("{label}: {}", outcome.message());
    for error in outcome.error_messages() {
        println!("  error: {error}");
    }
    println!("  duration: {:.1}s", outcome.duration().as_secs_f64());
    Ok(())
}

fn print_roles(cfg: &EngineConfig, json: bool) -> Result<()> {
    let resolver = resolver_for(cfg);
    let table = resolver.role_table();

    if json {
        let rows: Vec<_> = table
            .iter()
            .map(|(role, rel)| {
                let path = resolver.script_root().join(rel);
                serde_json::json!({
                    "role": role.slug(),
                    "path": path,
                    "present": path.is_file(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "roles ({}), scripts under {}:",
        table.len(),
        resolver.script_root().display()
    );
    for (role, rel) in table {
        let present = resolver.script_root().join(&rel).is_file();
        let marker = if present { "" } else { "  [missing]" };
        println!("  {:<30} {}{marker}", role.slug(), rel.display());
    }
    Ok(())
}

fn print_scripts(cfg: &EngineConfig, json: bool) -> Result<()> {
    let resolver = resolver_for(cfg);
    resolver
        .index_directory(&cfg.scripts.root)
        .context("failed to index the script directory")?;
    let scripts = resolver.indexed();

    if json {
        let rows: Vec<_> = scripts
            .iter()
            .map(|(name, path)| serde_json::json!({ "name": name, "path": path }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("scripts ({}):", scripts.len());
    for (name, path) in scripts {
        println!("  {name:<30} {}", path.display());
    }
    Ok(())
}

fn resolver_for(cfg: &EngineConfig) -> ScriptResolver {
    ScriptResolver::new(
        Arc::new(RealFileSystem),
        &cfg.scripts.root,
        &cfg.scripts.extension,
    )
}
