// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Tests for the service host

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::common_test::{Greeter, TestGreeter};
use crate::concurrency::{sleep, Duration};
use crate::envelope::ResponseFault;
use crate::IdScheme;

fn spawn_greeter(name: &str) -> Arc<ServiceHost<TestGreeter>> {
    let cache = BuildCache::new(IdScheme::ContentHash);
    ServiceHost::spawn_for::<dyn Greeter>(
        TargetId::new(name),
        Arc::new(TestGreeter::default()),
        &cache,
    )
    .expect("Failed to spawn host")
}

fn turn<F>(
    host: &ServiceHost<TestGreeter>,
    correlation_id: Option<&str>,
    f: F,
) -> TargetDispatch<TestGreeter>
where
    F: FnOnce(Arc<TestGreeter>) -> BoxFuture<'static, Result<Vec<u8>, DispatchErr>>
        + Send
        + 'static,
{
    TargetDispatch {
        target: host.target_id().clone(),
        context: MethodCallContext {
            interface: "Test".to_string(),
            method: "turn".to_string(),
            origin: CallOrigin::Remote,
        },
        retryable: false,
        invoker: Box::new(f),
        correlation_id: correlation_id.map(str::to_string),
        reentrant: false,
        cancel: CancellationToken::new(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_turns_are_serialized() {
    let host = spawn_greeter("serial");
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let calls = (0..8)
        .map(|_| {
            let active = active.clone();
            let max_active = max_active.clone();
            let dispatch = turn(&host, None, move |_| {
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(vec![])
                }
                .boxed()
            });
            let host = host.clone();
            tokio::spawn(async move { host.dispatch_to_target(dispatch).await })
        })
        .collect::<Vec<_>>();

    for call in calls {
        call.await.unwrap().expect("Turn failed");
    }
    assert_eq!(1, max_active.load(Ordering::SeqCst));
    assert_eq!(8, host.completed_turns());
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_reentrant_chain_runs_inline() {
    let host = spawn_greeter("reentrant");
    let inner_host = host.clone();

    let outer = turn(&host, Some("chain-1"), move |_| {
        async move {
            // the nested turn would wait behind this one forever if it were queued
            let inner = turn(&inner_host, Some("chain-1"), |_| {
                async move { Ok(vec![42u8]) }.boxed()
            });
            inner_host.dispatch_to_target(inner).await
        }
        .boxed()
    });

    let result = tokio::time::timeout(Duration::from_secs(1), host.dispatch_to_target(outer))
        .await
        .expect("Reentrant call deadlocked")
        .expect("Turn failed");
    assert_eq!(vec![42u8], result);
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stop_completes_in_flight_turn_and_rejects_queued() {
    let host = spawn_greeter("stopping");
    let (started_tx, started_rx) = crate::concurrency::oneshot::<()>();

    let slow = turn(&host, None, move |_| {
        async move {
            let _ = started_tx.send(());
            sleep(Duration::from_millis(50)).await;
            Ok(vec![1u8])
        }
        .boxed()
    });
    let queued = turn(&host, None, |_| async move { Ok(vec![2u8]) }.boxed());

    let slow_call = {
        let host = host.clone();
        tokio::spawn(async move { host.dispatch_to_target(slow).await })
    };
    started_rx.await.expect("Slow turn never started");
    let queued_call = {
        let host = host.clone();
        tokio::spawn(async move { host.dispatch_to_target(queued).await })
    };
    sleep(Duration::from_millis(5)).await;

    host.stop();
    assert_eq!(vec![1u8], slow_call.await.unwrap().expect("In-flight turn aborted"));
    let err = queued_call.await.unwrap().unwrap_err();
    assert!(err.is_target_gone());

    let late = turn(&host, None, |_| async move { Ok(vec![]) }.boxed());
    assert!(host.dispatch_to_target(late).await.unwrap_err().is_target_gone());
    host.stop_and_wait().await;
    assert!(host.is_stopped());
}

#[tokio::test]
async fn test_misaddressed_turn_is_rejected() {
    let host = spawn_greeter("alice");
    let mut dispatch = turn(&host, None, |_| async move { Ok(vec![]) }.boxed());
    dispatch.target = TargetId::new("bob");
    let err = host.dispatch_to_target(dispatch).await.unwrap_err();
    assert!(matches!(err, DispatchErr::TargetGone(target) if target.as_str() == "bob"));
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_handle_request_routes_through_the_mailbox() {
    let host = spawn_greeter("requests");
    let greeter = host.dispatchers().get(host.dispatchers().primary_id()).unwrap();
    let greet = greeter.description().method_at(0).unwrap();

    let mut args = crate::ArgumentWriter::new();
    args.push("mailbox".to_string());
    let request = RequestEnvelope::new(
        host.dispatchers().primary_id(),
        greet.id,
        args.into_bytes(),
    );
    let response = host.handle_request(request, CancellationToken::new()).await;
    let bytes = response.result.expect("Request failed");
    assert_eq!(
        "Hello mailbox",
        <String as crate::BytesConvertable>::from_bytes(bytes).unwrap()
    );
    assert_eq!(1, host.completed_turns());

    let unknown = RequestEnvelope::new(7, 7, vec![]);
    let response = host.handle_request(unknown, CancellationToken::new()).await;
    assert_eq!(Err(ResponseFault::UnknownInterface(7)), response.result);
    host.stop_and_wait().await;
}
