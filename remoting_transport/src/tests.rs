// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! End-to-end tests of both transport providers over loopback TCP

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use remoting::concurrency::{sleep, CancellationToken, Duration};
use remoting::{
    remote_interface, BuildCache, Channel, IdScheme, ProcessingErr, RemotingErr, RequestEnvelope,
    ResponseFault, ServiceHost, TargetId, TransportErr,
};

use super::*;

#[remote_interface(name = "transport.Calculator")]
trait Calculator: Send + Sync {
    async fn add(&self, left: i64, right: i64) -> Result<i64, ProcessingErr>;
    async fn divide(&self, left: i64, right: i64) -> Result<i64, ProcessingErr>;
    async fn pause(&self, millis: u64, cancel: CancellationToken) -> Result<(), ProcessingErr>;
    async fn echo(&self, payload: Vec<u8>) -> Result<Vec<u8>, ProcessingErr>;
}

#[derive(Default)]
struct TestCalculator {
    observed_cancel: AtomicBool,
}

#[remoting::async_trait]
impl Calculator for TestCalculator {
    async fn add(&self, left: i64, right: i64) -> Result<i64, ProcessingErr> {
        Ok(left + right)
    }

    async fn divide(&self, left: i64, right: i64) -> Result<i64, ProcessingErr> {
        if right == 0 {
            return Err(From::from("Division by zero"));
        }
        Ok(left / right)
    }

    async fn pause(&self, millis: u64, cancel: CancellationToken) -> Result<(), ProcessingErr> {
        tokio::select! {
            _ = sleep(Duration::from_millis(millis)) => {}
            _ = cancel.cancelled() => self.observed_cancel.store(true, Ordering::SeqCst),
        }
        Ok(())
    }

    async fn echo(&self, payload: Vec<u8>) -> Result<Vec<u8>, ProcessingErr> {
        Ok(payload)
    }
}

struct Served {
    calculator: Arc<TestCalculator>,
    host: Arc<ServiceHost<TestCalculator>>,
    cache: BuildCache,
}

impl Served {
    fn new() -> Self {
        let cache = BuildCache::new(IdScheme::ContentHash);
        let calculator = Arc::new(TestCalculator::default());
        let host = ServiceHost::spawn_for::<dyn Calculator>(
            TargetId::new("calculator"),
            calculator.clone(),
            &cache,
        )
        .expect("Failed to spawn the calculator");
        Self {
            calculator,
            host,
            cache,
        }
    }

    fn proxy(&self, channel: Arc<dyn Channel>) -> Arc<dyn Calculator> {
        self.cache
            .get_or_build_proxy_generator::<dyn Calculator>()
            .expect("Failed to build the proxy generator")
            .create_proxy(channel)
    }

    async fn wait_for_cancel(&self) {
        for _ in 0..100 {
            if self.calculator.observed_cancel.load(Ordering::SeqCst) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("The calculator never observed the cancellation");
    }
}

fn remoting_err(err: &ProcessingErr) -> &RemotingErr {
    err.downcast_ref::<RemotingErr>()
        .expect("Proxy errors are RemotingErrs")
}

#[tokio::test]
async fn test_stream_round_trip() {
    let served = Served::new();
    let settings = StreamTransportSettings::default();
    let listener = Listener::stream("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let channel = Arc::new(
        StreamChannel::connect(listener.local_addr(), settings)
            .await
            .unwrap(),
    );
    let calculator = served.proxy(channel.clone());

    assert_eq!(5, calculator.add(2, 3).await.unwrap());
    assert_eq!(4, calculator.divide(8, 2).await.unwrap());

    let err = calculator.divide(1, 0).await.unwrap_err();
    let failure = remoting_err(&err)
        .remote_failure()
        .expect("Expected a remote failure");
    assert_eq!("transport.Calculator", failure.interface);
    assert_eq!("divide", failure.method);
    assert_eq!("Division by zero", failure.message);

    channel.close().await.unwrap();
    assert!(channel.is_closed());
    served.host.stop_and_wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stream_multiplexes_concurrent_calls() {
    let served = Served::new();
    let settings = StreamTransportSettings::default().with_max_concurrent_calls(8);
    let listener = Listener::stream("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let channel = StreamChannel::connect(listener.local_addr(), settings)
        .await
        .unwrap();
    let calculator = served.proxy(Arc::new(channel));

    let calls = (0..64i64)
        .map(|i| {
            let calculator = calculator.clone();
            tokio::spawn(async move { calculator.add(i, i).await })
        })
        .collect::<Vec<_>>();
    for (i, call) in calls.into_iter().enumerate() {
        let sum = call.await.unwrap().expect("Call failed");
        assert_eq!(2 * i as i64, sum);
    }
    assert_eq!(1, listener.sessions_opened());
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stream_operation_timeout_abandons_the_call() {
    let served = Served::new();
    let listener = Listener::stream(
        "127.0.0.1:0",
        served.host.clone(),
        &StreamTransportSettings::default(),
    )
    .await
    .unwrap();
    let settings =
        StreamTransportSettings::default().with_operation_timeout(Duration::from_millis(50));
    let channel = Arc::new(
        StreamChannel::connect(listener.local_addr(), settings)
            .await
            .unwrap(),
    );
    let calculator = served.proxy(channel.clone());

    let err = calculator
        .pause(1000, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        remoting_err(&err),
        RemotingErr::Transport(TransportErr::OperationTimeout(timeout)) if *timeout == Duration::from_millis(50)
    ));
    assert_eq!(0, channel.pending_calls());
    // the listener cancels the abandoned call
    served.wait_for_cancel().await;

    // the connection survives
    assert_eq!(3, calculator.add(1, 2).await.unwrap());
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stream_cancellation_drops_the_pending_slot() {
    let served = Served::new();
    let settings = StreamTransportSettings::default();
    let listener = Listener::stream("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let channel = Arc::new(
        StreamChannel::connect(listener.local_addr(), settings)
            .await
            .unwrap(),
    );
    let calculator = served.proxy(channel.clone());

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };
    let err = calculator.pause(5000, cancel).await.unwrap_err();
    assert!(matches!(
        remoting_err(&err),
        RemotingErr::Transport(TransportErr::Cancelled)
    ));
    canceller.await.unwrap();
    assert_eq!(0, channel.pending_calls());
    served.wait_for_cancel().await;
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stream_rejects_oversized_requests_locally() {
    let served = Served::new();
    let listener = Listener::stream(
        "127.0.0.1:0",
        served.host.clone(),
        &StreamTransportSettings::default(),
    )
    .await
    .unwrap();
    let settings = StreamTransportSettings::default().with_max_message_size(1024);
    let channel = Arc::new(
        StreamChannel::connect(listener.local_addr(), settings)
            .await
            .unwrap(),
    );
    let calculator = served.proxy(channel.clone());

    let err = calculator.echo(vec![7u8; 4096]).await.unwrap_err();
    assert!(matches!(
        remoting_err(&err),
        RemotingErr::Transport(TransportErr::MessageTooLarge { max: 1024, .. })
    ));
    assert_eq!(vec![7u8; 16], calculator.echo(vec![7u8; 16]).await.unwrap());
    assert!(!channel.is_closed());
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stream_closes_when_the_listener_shuts_down() {
    let served = Served::new();
    let settings = StreamTransportSettings::default();
    let listener = Listener::stream("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let channel = Arc::new(
        StreamChannel::connect(listener.local_addr(), settings)
            .await
            .unwrap(),
    );
    let calculator = served.proxy(channel.clone());
    assert_eq!(2, calculator.add(1, 1).await.unwrap());

    listener.shutdown_and_wait().await;
    tokio::time::timeout(Duration::from_secs(1), async {
        while !channel.is_closed() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Channel never observed the closed connection");

    let err = calculator.add(1, 1).await.unwrap_err();
    assert!(matches!(
        remoting_err(&err),
        RemotingErr::Transport(TransportErr::Closed)
    ));
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_stream_carries_faults() {
    let served = Served::new();
    let settings = StreamTransportSettings::default();
    let listener = Listener::stream("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let channel = StreamChannel::connect(listener.local_addr(), settings)
        .await
        .unwrap();

    let response = channel
        .send(
            RequestEnvelope::new(0xdead, 1, vec![]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(Err(ResponseFault::UnknownInterface(0xdead)), response.result);

    served.host.stop_and_wait().await;
    let calculator = served.proxy(Arc::new(channel));
    let err = calculator.add(1, 1).await.unwrap_err();
    assert!(remoting_err(&err).is_target_gone());
}

#[tokio::test]
async fn test_connect_failures_surface() {
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let err = StreamChannel::connect(addr, StreamTransportSettings::default())
        .await
        .err()
        .expect("Nothing is listening");
    assert!(matches!(err, TransportErr::Io(_)));

    let channel = BindingChannel::new(addr, BindingTransportSettings::default());
    let err = channel
        .send(RequestEnvelope::new(1, 1, vec![]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportErr::Io(_)));
}

#[tokio::test]
async fn test_binding_opens_a_connection_per_call() {
    let served = Served::new();
    let settings = BindingTransportSettings::default();
    let listener = Listener::binding("127.0.0.1:0", served.host.clone(), &settings)
        .await
        .unwrap();
    let calculator = served.proxy(Arc::new(BindingChannel::new(
        listener.local_addr(),
        settings,
    )));

    assert_eq!(3, calculator.add(1, 2).await.unwrap());
    assert_eq!(5, calculator.divide(10, 2).await.unwrap());
    let err = calculator.divide(1, 0).await.unwrap_err();
    assert_eq!(
        "Division by zero",
        remoting_err(&err).remote_failure().unwrap().message
    );
    assert_eq!(3, listener.sessions_opened());
    served.host.stop_and_wait().await;
}

#[tokio::test]
async fn test_binding_timeout_cancels_the_remote_call() {
    let served = Served::new();
    let listener = Listener::binding(
        "127.0.0.1:0",
        served.host.clone(),
        &BindingTransportSettings::default(),
    )
    .await
    .unwrap();
    let settings = BindingTransportSettings::default()
        .with_operation_timeout(Duration::from_millis(50))
        .with_keep_alive_interval(Duration::from_millis(10));
    let calculator = served.proxy(Arc::new(BindingChannel::new(
        listener.local_addr(),
        settings,
    )));

    let err = calculator
        .pause(1000, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        remoting_err(&err),
        RemotingErr::Transport(TransportErr::OperationTimeout(_))
    ));
    // dropping the connection cancels the call on the listener
    served.wait_for_cancel().await;
    assert_eq!(2, calculator.add(1, 1).await.unwrap());
    served.host.stop_and_wait().await;
}
