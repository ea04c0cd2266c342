// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Tests for scheduled callbacks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::concurrency::sleep;
use crate::dispatch::{DispatcherSet, InvokerBinder};
use crate::host::ServiceHost;
use crate::{DispatchErr, TargetGone};

#[derive(Default)]
struct Ticker {
    ticks: AtomicUsize,
}

async fn tick(ticker: Arc<Ticker>, _state: ()) -> Result<(), ProcessingErr> {
    ticker.ticks.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

fn spawn_ticker(name: &str) -> (Arc<Ticker>, Arc<ServiceHost<Ticker>>) {
    let ticker = Arc::new(Ticker::default());
    let dispatchers = DispatcherSet::build(&[], &InvokerBinder::<Ticker>::new())
        .expect("An empty dispatcher set always builds");
    let host = ServiceHost::spawn(TargetId::new(name), ticker.clone(), Arc::new(dispatchers));
    (ticker, host)
}

/// Runs every turn inline, recording its context
struct RecordingTarget {
    id: TargetId,
    ticker: Arc<Ticker>,
    contexts: parking_lot::Mutex<Vec<MethodCallContext>>,
}

#[async_trait::async_trait]
impl DispatchTarget<Ticker> for RecordingTarget {
    fn target_id(&self) -> &TargetId {
        &self.id
    }

    async fn dispatch_to_target(
        &self,
        dispatch: TargetDispatch<Ticker>,
    ) -> Result<Vec<u8>, DispatchErr> {
        self.contexts.lock().push(dispatch.context.clone());
        (dispatch.invoker)(self.ticker.clone()).await
    }
}

#[tokio::test]
async fn test_periodic_fires_until_stopped() {
    let (ticker, host) = spawn_ticker("periodic");
    let timer = ScheduledCallback::register(
        host.clone(),
        tick,
        (),
        Duration::from_millis(100),
        Some(Duration::from_millis(50)),
    );
    assert_eq!(TimerState::Armed, timer.state());

    sleep(Duration::from_millis(80)).await;
    assert_eq!(0, timer.fire_count());

    sleep(Duration::from_millis(250)).await;
    let fired = timer.fire_count();
    assert!(fired >= 3, "Expected at least 3 fires, observed {fired}");

    timer.stop();
    assert_eq!(TimerState::Cancelled, timer.state());
    let at_stop = ticker.ticks.load(Ordering::SeqCst);

    sleep(Duration::from_millis(200)).await;
    assert!(ticker.ticks.load(Ordering::SeqCst) <= at_stop + 1);
    assert!(timer.fire_count() <= fired + 1);

    tokio::time::timeout(Duration::from_secs(1), timer.stopped())
        .await
        .expect("Stopped timer task didn't exit");
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_target_gone_signal_cancels_the_timer() {
    let (_ticker, host) = spawn_ticker("vanishing");
    let calls = Arc::new(AtomicUsize::new(0));

    let timer = ScheduledCallback::register(
        host.clone(),
        |_ticker: Arc<Ticker>, calls: Arc<AtomicUsize>| async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result: Result<(), ProcessingErr> = if call == 3 {
                Err(From::from(TargetGone(TargetId::new("vanishing"))))
            } else {
                Ok(())
            };
            result
        },
        calls.clone(),
        Duration::from_millis(10),
        Some(Duration::from_millis(10)),
    );

    tokio::time::timeout(Duration::from_secs(1), timer.stopped())
        .await
        .expect("Timer kept running after the target was gone");
    assert_eq!(3, calls.load(Ordering::SeqCst));
    assert_eq!(3, timer.fire_count());
    assert_eq!(TimerState::Cancelled, timer.state());

    // stopping a cancelled timer is a no-op
    timer.stop();
    timer.stop();
    assert_eq!(TimerState::Cancelled, timer.state());
    assert_eq!(3, calls.load(Ordering::SeqCst));
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_transient_failures_keep_the_schedule() {
    let (_ticker, host) = spawn_ticker("flaky");
    let calls = Arc::new(AtomicUsize::new(0));

    let timer = ScheduledCallback::register(
        host.clone(),
        |_ticker: Arc<Ticker>, calls: Arc<AtomicUsize>| async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result: Result<(), ProcessingErr> = if call == 2 {
                Err(From::from("transient failure"))
            } else {
                Ok(())
            };
            result
        },
        calls.clone(),
        Duration::from_millis(10),
        Some(Duration::from_millis(20)),
    );

    sleep(Duration::from_millis(200)).await;
    assert!(calls.load(Ordering::SeqCst) >= 4);
    assert_ne!(TimerState::Cancelled, timer.state());

    timer.stop();
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_torn_down_target_cancels_the_timer() {
    let (ticker, host) = spawn_ticker("torn-down");
    let timer = ScheduledCallback::register(
        host.clone(),
        tick,
        (),
        Duration::from_millis(10),
        Some(Duration::from_millis(10)),
    );
    sleep(Duration::from_millis(45)).await;
    host.stop_and_wait().await;
    let ticks = ticker.ticks.load(Ordering::SeqCst);
    assert!(ticks >= 1);

    tokio::time::timeout(Duration::from_secs(1), timer.stopped())
        .await
        .expect("Timer kept running after its host stopped");
    assert_eq!(TimerState::Cancelled, timer.state());
    assert_eq!(ticks, ticker.ticks.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_one_shot_fires_once() {
    let (ticker, host) = spawn_ticker("once");
    let timer = ScheduledCallback::register(host.clone(), tick, (), Duration::from_millis(10), None);

    tokio::time::timeout(Duration::from_secs(1), timer.stopped())
        .await
        .expect("One-shot timer didn't finish");
    assert_eq!(1, ticker.ticks.load(Ordering::SeqCst));
    assert_eq!(TimerState::Cancelled, timer.state());
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_dropping_the_handle_stops_the_timer() {
    let (ticker, host) = spawn_ticker("dropped");
    let timer = ScheduledCallback::register(
        host.clone(),
        tick,
        (),
        Duration::from_millis(50),
        Some(Duration::from_millis(10)),
    );
    drop(timer);

    sleep(Duration::from_millis(120)).await;
    assert_eq!(0, ticker.ticks.load(Ordering::SeqCst));
    host.stop_and_wait().await;
}

#[tokio::test]
async fn test_fires_are_tagged_as_scheduled() {
    let target = Arc::new(RecordingTarget {
        id: TargetId::new("recorded"),
        ticker: Arc::new(Ticker::default()),
        contexts: parking_lot::Mutex::new(vec![]),
    });
    let timer = ScheduledCallback::register(
        target.clone(),
        tick,
        (),
        Duration::from_millis(5),
        None,
    );
    assert_eq!("tick", timer.callback_name());
    assert_eq!("recorded", timer.target_id().as_str());

    tokio::time::timeout(Duration::from_secs(1), timer.stopped())
        .await
        .expect("One-shot timer didn't finish");
    let contexts = target.contexts.lock().clone();
    assert_eq!(
        vec![MethodCallContext {
            interface: "ScheduledCallback".to_string(),
            method: "tick".to_string(),
            origin: CallOrigin::Scheduled,
        }],
        contexts
    );
    assert_eq!(1, target.ticker.ticks.load(Ordering::SeqCst));
}

#[test]
fn test_callback_names() {
    assert_eq!("tick", callback_name_of(&tick));
    let closure = |_: u8| {};
    assert_eq!("test_callback_names", callback_name_of(&closure));
}

fn callback_name_of<F>(_: &F) -> String {
    callback_name::<F>()
}
