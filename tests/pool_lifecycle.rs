mod common;

use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use vmprov::errors::PoolError;
use vmprov::interp::InterpreterPool;
use vmprov::params::ParameterCollection;
use vmprov::session::{InterpreterFault, StatusUpdate};

use crate::common::{init_tracing, inline_session, with_timeout};

#[test]
fn invalid_sizes_are_rejected() {
    assert_eq!(
        InterpreterPool::open(0, 0).unwrap_err(),
        PoolError::InvalidSize { min: 0, max: 0 }
    );
    assert_eq!(
        InterpreterPool::open(3, 2).unwrap_err(),
        PoolError::InvalidSize { min: 3, max: 2 }
    );
}

#[test]
fn min_interpreters_open_eagerly() {
    let pool = InterpreterPool::open(2, 3).unwrap();
    let status = pool.status();
    assert_eq!((status.live, status.idle, status.leased), (2, 2, 0));
    assert!(!status.closed);
}

#[tokio::test]
async fn pool_grows_lazily_up_to_max() {
    init_tracing();
    let pool = InterpreterPool::open(0, 2).unwrap();
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(pool.status().live, 2);
    assert_eq!(pool.status().leased, 2);

    drop(a);
    b.release();
    let status = pool.status();
    assert_eq!((status.live, status.idle, status.leased), (2, 2, 0));
}

#[tokio::test]
async fn acquire_waits_while_all_interpreters_are_leased() {
    init_tracing();
    let pool = InterpreterPool::open(1, 1).unwrap();
    let first = pool.acquire().await.unwrap();
    let first_id = first.id();

    let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(blocked.is_err(), "second acquire should wait for a free slot");

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.release();

    let second_id = with_timeout(waiter).await.unwrap().unwrap();
    assert_eq!(second_id, first_id, "the idle interpreter is reused");
}

#[tokio::test]
async fn close_is_idempotent_and_rejects_later_acquires() {
    init_tracing();
    let pool = InterpreterPool::open(2, 2).unwrap();

    assert!(pool.close().await);
    assert!(!pool.close().await);

    let status = pool.status();
    assert!(status.closed);
    assert_eq!((status.live, status.idle), (0, 0));
    assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_fails_waiting_acquirers() {
    init_tracing();
    let pool = InterpreterPool::open(1, 1).unwrap();
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let closer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.close().await })
    };

    let waited = with_timeout(waiter).await.unwrap();
    assert_eq!(waited, Err(PoolError::Closed));
    assert!(!closer.is_finished(), "close waits for the outstanding lease");

    drop(held);
    assert!(with_timeout(closer).await.unwrap());
    assert_eq!(pool.status().live, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_stops_an_in_flight_session() {
    init_tracing();
    let pool = InterpreterPool::open(1, 1).unwrap();

    let source = r#"
        write_output({ Type = "StatusUpdate", PercentComplete = 5, StatusMessage = "working" })
        while true do sleep(10) end
    "#;
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let session_task = {
        let pool = pool.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            let mut started = Some(started_tx);
            let mut session = inline_session(&pool, &source, ParameterCollection::new());
            session
                .run(&CancellationToken::new(), move |_: &StatusUpdate| {
                    if let Some(tx) = started.take() {
                        let _ = tx.send(());
                    }
                })
                .await
        })
    };

    with_timeout(started_rx).await.unwrap();
    assert_eq!(pool.status().leased, 1);

    assert!(with_timeout(pool.close()).await);

    let result = with_timeout(session_task).await.unwrap().unwrap();
    assert_eq!(result.exception, Some(InterpreterFault::PoolClosed));
    assert!(!result.succeeded());
    assert_eq!(result.status_updates.len(), 1);

    let status = pool.status();
    assert_eq!((status.live, status.idle, status.leased), (0, 0, 0));
    assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Closed);
}
