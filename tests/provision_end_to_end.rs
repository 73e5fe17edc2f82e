mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vmprov::interp::InterpreterPool;
use vmprov::params::ParameterCollection;
use vmprov::provision::{ChannelSink, JobState, NullSink, ProgressEvent, Provisioner};
use vmprov::resolve::{Role, ScriptHandle, ScriptResolver};
use vmprov::fs::RealFileSystem;
use vmprov::store::{ConfigurationStore, JsonConfigurationStore};

use crate::common::{
    CREATE_VM_SCRIPT, RecordingSink, VmConfigurationBuilder, engine, init_tracing, quick_options,
    script_tree, with_timeout,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn create_vm_reports_progress_and_success() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", CREATE_VM_SCRIPT)]);
    let provisioner = engine(dir.path());
    let sink = RecordingSink::new();

    let config = VmConfigurationBuilder::new("X")
        .cpus(2)
        .memory_gb(4)
        .storage_gb(80)
        .build();
    let outcome = with_timeout(provisioner.provision(&config, &sink, &CancellationToken::new())).await;

    assert_eq!(sink.percentages(), [25, 50, 75, 100]);
    assert_eq!(
        &sink.messages()[..3],
        [
            "Creating virtual machine...",
            "Configuring operating system...",
            "Finalizing VM creation...",
        ]
    );
    assert!(outcome.success());
    assert_eq!(outcome.state(), JobState::Succeeded);
    assert_eq!(outcome.message(), "VM 'X' created successfully.");
    assert!(outcome.error_messages().is_empty());
    assert_eq!(outcome.script(), Some("custom-vm"));
    assert_eq!(outcome.current_operation(), "Finalizing VM creation...");
    assert!(outcome.completion_time() >= outcome.start_time());
    assert_eq!(sink.finish_count(), 1);

    provisioner.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn role_scripts_are_picked_by_role() -> TestResult {
    init_tracing();
    let dir = script_tree(&[
        (
            "role-configuration/file-server.lua",
            "write_output({ Type = 'Result', Success = true, Message = 'file server for ' .. VMName })",
        ),
        ("role-configuration/custom-vm.lua", "write_error('wrong script')"),
    ]);
    let provisioner = engine(dir.path());

    let config = VmConfigurationBuilder::new("fs01").role(Role::FileServer).build();
    let outcome = provisioner
        .provision(&config, &NullSink, &CancellationToken::new())
        .await;

    assert!(outcome.success(), "{:?}", outcome.error_messages());
    assert_eq!(outcome.message(), "file server for fs01");
    assert_eq!(outcome.script(), Some("file-server"));
    Ok(())
}

#[tokio::test]
async fn explicit_script_name_overrides_the_role() -> TestResult {
    init_tracing();
    let dir = script_tree(&[
        ("custom/Special-Setup.lua", "print(ComputerName)"),
        ("role-configuration/web-server.lua", "write_error('should not run')"),
    ]);
    let provisioner = engine(dir.path());

    let config = VmConfigurationBuilder::new("web01")
        .role(Role::WebServer)
        .script("special-setup")
        .computer_name("WEB-01")
        .build();
    let outcome = provisioner
        .provision(&config, &NullSink, &CancellationToken::new())
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.message(), "Provisioning completed successfully.");
    assert_eq!(outcome.script(), Some("Special-Setup"));
    Ok(())
}

#[tokio::test]
async fn unknown_script_name_is_a_failed_outcome() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", "")]);
    let provisioner = engine(dir.path());
    let sink = RecordingSink::new();

    let config = VmConfigurationBuilder::new("x").script("does-not-exist").build();
    let outcome = provisioner
        .provision(&config, &sink, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state(), JobState::Failed);
    assert!(outcome.message().contains("does-not-exist"));
    assert_eq!(outcome.error_messages().len(), 1);
    assert_eq!(sink.percentages(), [100], "a closing update is always sent");
    assert_eq!(sink.finish_count(), 1);
    Ok(())
}

#[tokio::test]
async fn error_records_fail_the_job_with_one_message_each() -> TestResult {
    init_tracing();
    let dir = script_tree(&[(
        "role-configuration/custom-vm.lua",
        r#"
            write_output({ Type = "StatusUpdate", PercentComplete = 30, StatusMessage = "Creating switch" })
            write_error("Switch 'Lab' not found")
            write_error({ Message = "Disk quota exceeded", Code = 112 })
        "#,
    )]);
    let provisioner = engine(dir.path());
    let sink = RecordingSink::new();

    let outcome = provisioner
        .provision(&VmConfigurationBuilder::new("x").build(), &sink, &CancellationToken::new())
        .await;

    assert!(!outcome.success());
    assert_eq!(outcome.message(), "Provisioning failed with 2 error(s).");
    assert_eq!(
        outcome.error_messages(),
        ["Switch 'Lab' not found", "Disk quota exceeded"]
    );
    assert_eq!(sink.percentages(), [30, 100]);
    Ok(())
}

#[tokio::test]
async fn missing_role_script_is_a_fault() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("other.lua", "")]);
    let provisioner = engine(dir.path());

    let config = VmConfigurationBuilder::new("dc01")
        .role(Role::DomainController)
        .build();
    let outcome = provisioner
        .provision(&config, &NullSink, &CancellationToken::new())
        .await;

    assert_eq!(outcome.state(), JobState::Failed);
    assert!(outcome.message().starts_with("Script execution failed: script file not found"));
    assert_eq!(outcome.error_messages().len(), 1);
    Ok(())
}

#[tokio::test]
async fn provision_from_path_loads_through_the_store() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", CREATE_VM_SCRIPT)]);
    let provisioner = engine(dir.path());

    let doc = dir.path().join("vms/x.json");
    let config = VmConfigurationBuilder::new("X").build();
    JsonConfigurationStore::new().save(&doc, &config).await?;

    let outcome = provisioner
        .provision_from_path(&doc, &NullSink, &CancellationToken::new())
        .await;
    assert!(outcome.success());
    assert_eq!(outcome.message(), "VM 'X' created successfully.");
    Ok(())
}

#[tokio::test]
async fn unreadable_document_fails_without_leasing() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", ""), ("bad.json", "{ nope")]);
    let cfg = crate::common::EngineConfigBuilder::new(dir.path())
        .pool(0, 1)
        .build();
    let provisioner = Provisioner::from_config(&cfg)?;
    let sink = RecordingSink::new();

    for path in [dir.path().join("bad.json"), dir.path().join("absent.json")] {
        let outcome = provisioner
            .provision_from_path(&path, &sink, &CancellationToken::new())
            .await;
        assert_eq!(outcome.state(), JobState::Failed);
        assert!(outcome.message().starts_with("Failed to load configuration"));
        assert_eq!(outcome.current_operation(), "Loading configuration");
        assert!(outcome.script().is_none());
    }
    assert_eq!(provisioner.pool().status().live, 0);
    Ok(())
}

#[tokio::test]
async fn role_provisioning_merges_overrides_over_defaults() -> TestResult {
    init_tracing();
    let dir = script_tree(&[(
        "role-configuration/sql-server.lua",
        r#"
            write_output({
                Type = "Result",
                Success = true,
                Message = string.format("%s cpu=%d mem=%d", VMName, CPUCount, MemoryGB),
            })
        "#,
    )]);
    let provisioner = engine(dir.path());

    let overrides = ParameterCollection::new()
        .with("vmname", "sql01")
        .with("cpucount", 8_i64);
    let outcome = provisioner
        .provision_role(&Role::SqlServer, overrides, &NullSink, &CancellationToken::new())
        .await;

    assert!(outcome.success(), "{:?}", outcome.error_messages());
    assert_eq!(outcome.message(), "sql01 cpu=8 mem=16");
    Ok(())
}

#[tokio::test]
async fn run_named_and_inline_scripts_share_the_pipeline() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("tools/ping.lua", "print('pong')")]);
    let provisioner = engine(dir.path());

    let named = provisioner
        .run_named("PING", ParameterCollection::new(), &NullSink, &CancellationToken::new())
        .await;
    assert!(named.success());

    let missing = provisioner
        .run_named("pong", ParameterCollection::new(), &NullSink, &CancellationToken::new())
        .await;
    assert_eq!(missing.state(), JobState::Failed);

    let (sink, mut rx) = ChannelSink::new();
    let inline = provisioner
        .provision_script(
            ScriptHandle::inline("adhoc", "write_output({ Type = 'StatusUpdate', PercentComplete = 60, StatusMessage = 'half' })"),
            ParameterCollection::new(),
            &sink,
            &CancellationToken::new(),
        )
        .await;
    assert!(inline.success());

    let mut percents = Vec::new();
    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            ProgressEvent::Status(u) => percents.push(u.percent_complete),
            ProgressEvent::Finished(outcome) => finished = Some(outcome),
        }
    }
    assert_eq!(percents, [60, 100]);
    assert_eq!(finished.map(|o| o.state()), Some(JobState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_the_pool_once() -> TestResult {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", "")]);
    let provisioner = engine(dir.path());

    assert!(provisioner.shutdown().await);
    assert!(!provisioner.shutdown().await);

    let outcome = provisioner
        .provision(&VmConfigurationBuilder::new("late").build(), &NullSink, &CancellationToken::new())
        .await;
    assert_eq!(outcome.state(), JobState::Failed);
    assert!(outcome.message().contains("interpreter pool is closed"));
    Ok(())
}

#[tokio::test]
async fn concurrent_jobs_share_a_bounded_pool() -> TestResult {
    init_tracing();
    let dir = script_tree(&[(
        "role-configuration/custom-vm.lua",
        "sleep(30)\nwrite_output({ Type = 'Result', Success = true, Message = VMName })",
    )]);
    let resolver = ScriptResolver::new(Arc::new(RealFileSystem), dir.path(), "lua");
    resolver.index_directory(dir.path())?;
    let provisioner = Arc::new(Provisioner::new(
        InterpreterPool::open(1, 2)?,
        Arc::new(resolver),
        Arc::new(JsonConfigurationStore::new()),
        quick_options(),
    ));

    let mut jobs = Vec::new();
    for i in 0..5 {
        let provisioner = Arc::clone(&provisioner);
        jobs.push(tokio::spawn(async move {
            let config = VmConfigurationBuilder::new(&format!("vm{i}")).build();
            provisioner
                .provision(&config, &NullSink, &CancellationToken::new())
                .await
        }));
    }

    for (i, job) in jobs.into_iter().enumerate() {
        let outcome = with_timeout(job).await?;
        assert!(outcome.success());
        assert_eq!(outcome.message(), format!("vm{i}"));
    }
    assert!(provisioner.pool().status().live <= 2);
    Ok(())
}

#[tokio::test]
async fn closure_sinks_see_percent_and_message() -> TestResult {
    use std::sync::Mutex;
    use vmprov::provision::FnSink;

    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", CREATE_VM_SCRIPT)]);
    let provisioner = engine(dir.path());

    let seen = Mutex::new(Vec::new());
    let sink = FnSink(|percent: u8, message: &str| {
        seen.lock().unwrap().push(format!("{percent}:{message}"));
    });
    provisioner
        .provision(&VmConfigurationBuilder::new("Y").build(), &sink, &CancellationToken::new())
        .await;

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.first().map(String::as_str), Some("25:Creating virtual machine..."));
    assert_eq!(seen.last().map(String::as_str), Some("100:VM 'Y' created successfully."));
    Ok(())
}
