mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vmprov::errors::SessionError;
use vmprov::interp::InterpreterPool;
use vmprov::params::ParameterCollection;
use vmprov::provision::{JobState, ProgressSink, ProvisioningOutcome};
use vmprov::session::StatusUpdate;

use crate::common::{
    CREATE_VM_SCRIPT, VmConfigurationBuilder, engine, init_tracing, inline_session, script_tree,
    with_timeout,
};

const SLOW_SCRIPT: &str = r#"
write_output({ Type = "StatusUpdate", PercentComplete = 10, StatusMessage = "Creating virtual machine..." })
sleep(5000)
write_output({ Type = "StatusUpdate", PercentComplete = 50, StatusMessage = "Configuring operating system..." })
write_output({ Type = "Result", Success = true, Message = "should never get here" })
"#;

/// Sink that cancels the job as soon as the first status update arrives.
struct CancelOnFirstUpdate {
    cancel: CancellationToken,
    updates: Mutex<Vec<StatusUpdate>>,
    finished: Mutex<Vec<ProvisioningOutcome>>,
}

impl ProgressSink for CancelOnFirstUpdate {
    fn report(&self, update: &StatusUpdate) {
        self.updates.lock().unwrap().push(update.clone());
        self.cancel.cancel();
    }

    fn finish(&self, outcome: &ProvisioningOutcome) {
        self.finished.lock().unwrap().push(outcome.clone());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_after_first_update_stops_the_job() {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", SLOW_SCRIPT)]);
    let provisioner = engine(dir.path());

    let cancel = CancellationToken::new();
    let sink = CancelOnFirstUpdate {
        cancel: cancel.clone(),
        updates: Mutex::new(Vec::new()),
        finished: Mutex::new(Vec::new()),
    };

    let started = std::time::Instant::now();
    let outcome = with_timeout(provisioner.provision(
        &VmConfigurationBuilder::new("X").build(),
        &sink,
        &cancel,
    ))
    .await;

    assert!(
        started.elapsed() < Duration::from_secs(4),
        "the script must be stopped, not run to completion"
    );
    assert_eq!(outcome.state(), JobState::Cancelled);
    assert!(outcome.is_cancelled());
    assert!(!outcome.success());
    assert_eq!(outcome.message(), "Provisioning was cancelled.");

    let updates = sink.updates.lock().unwrap().clone();
    assert_eq!(updates, vec![StatusUpdate::new(10, "Creating virtual machine...")]);
    assert_eq!(sink.finished.lock().unwrap().len(), 1);

    // The interpreter came back and is usable.
    let status = provisioner.pool().status();
    assert_eq!(status.leased, 0);
    assert_eq!(status.live, status.idle);
    provisioner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_script_that_finishes_at_once_still_cancels() {
    init_tracing();
    let dir = script_tree(&[("role-configuration/custom-vm.lua", CREATE_VM_SCRIPT)]);
    let provisioner = engine(dir.path());

    // No sleep in the script: it is usually done before the first poll tick.
    for _ in 0..40 {
        let cancel = CancellationToken::new();
        let sink = CancelOnFirstUpdate {
            cancel: cancel.clone(),
            updates: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        };

        let outcome = with_timeout(provisioner.provision(
            &VmConfigurationBuilder::new("X").build(),
            &sink,
            &cancel,
        ))
        .await;

        assert_eq!(outcome.state(), JobState::Cancelled);
        assert!(!outcome.success());
        let percents: Vec<u8> = sink
            .updates
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.percent_complete)
            .collect();
        assert_eq!(percents, [25]);
        assert_eq!(sink.finished.lock().unwrap().len(), 1);
    }

    assert_eq!(provisioner.pool().status().leased, 0);
    provisioner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_cancel_carries_partial_output() {
    init_tracing();
    let pool = InterpreterPool::open(1, 1).unwrap();
    let cancel = CancellationToken::new();

    let source = r#"
        print("phase one")
        write_error("non-fatal")
        write_output({ Type = "StatusUpdate", PercentComplete = 20, StatusMessage = "busy" })
        write_error("e1")
        write_error("e2")
        write_output({ Type = "StatusUpdate", PercentComplete = 40, StatusMessage = "still busy" })
        write_error("e3")
        write_information("late")
        while true do end
    "#;
    let seen = Arc::new(Mutex::new(0usize));
    let mut session = inline_session(&pool, source, ParameterCollection::new());

    let counter = Arc::clone(&seen);
    let trigger = cancel.clone();
    let result = with_timeout(session.run(&cancel, move |_| {
        *counter.lock().unwrap() += 1;
        trigger.cancel();
    }))
    .await;

    match result {
        Err(SessionError::Cancelled(partial)) => {
            assert_eq!(partial.success, Some(false));
            assert_eq!(
                partial.message.as_deref(),
                Some("Script execution was cancelled.")
            );
            assert_eq!(partial.status_updates.len(), 1);
            assert_eq!(partial.error_messages(), ["non-fatal", "e1", "e2", "e3"]);
            assert_eq!(partial.information.len(), 1);
            assert_eq!(partial.plain_output.len(), 1);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(*seen.lock().unwrap(), 1);

    let status = pool.status();
    assert_eq!((status.live, status.idle, status.leased), (1, 1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_waiting_for_an_interpreter() {
    init_tracing();
    let pool = InterpreterPool::open(1, 1).unwrap();
    let held = pool.acquire().await.unwrap();

    let cancel = CancellationToken::new();
    let mut session = inline_session(&pool, "print('never')", ParameterCollection::new());
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let result = with_timeout(session.run(&cancel, |_| {})).await;
    assert!(matches!(result, Err(SessionError::Cancelled(_))));
    canceller.await.unwrap();

    drop(held);
    assert_eq!(pool.status().leased, 0);
}
