// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A calculator service with a small interface hierarchy, hosted in-process and called through
//! a loopback channel

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use remoting::concurrency::{sleep, CancellationToken, Duration};
use remoting::{
    remote_interface, BuildCache, LoopbackChannel, ProcessingErr, RemoteInterface,
    ScheduledCallback, ServiceHost, TargetId,
};

/// Plain arithmetic
#[remote_interface(name = "playground.Arithmetic")]
pub trait Arithmetic: Send + Sync {
    async fn add(&self, left: i64, right: i64) -> Result<i64, ProcessingErr>;
    async fn divide(&self, left: i64, right: i64) -> Result<i64, ProcessingErr>;
}

/// Arithmetic with a memory register
#[remote_interface(name = "playground.Calculator")]
pub trait Calculator: Arithmetic {
    async fn store(&self, value: i64) -> Result<(), ProcessingErr>;
    async fn recall(&self) -> Result<i64, ProcessingErr>;
    async fn slow_square(
        &self,
        value: i64,
        cancel: CancellationToken,
    ) -> Result<i64, ProcessingErr>;
}

#[derive(Default)]
pub struct PlaygroundCalculator {
    memory: AtomicI64,
    operations: AtomicU64,
}

impl PlaygroundCalculator {
    fn count(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }
}

#[remoting::async_trait]
impl Arithmetic for PlaygroundCalculator {
    async fn add(&self, left: i64, right: i64) -> Result<i64, ProcessingErr> {
        self.count();
        left
            .checked_add(right)
            .ok_or_else(|| From::from(format!("{left} + {right} overflows")))
    }

    async fn divide(&self, left: i64, right: i64) -> Result<i64, ProcessingErr> {
        self.count();
        if right == 0 {
            return Err(From::from("Division by zero"));
        }
        Ok(left / right)
    }
}

#[remoting::async_trait]
impl Calculator for PlaygroundCalculator {
    async fn store(&self, value: i64) -> Result<(), ProcessingErr> {
        self.count();
        self.memory.store(value, Ordering::Relaxed);
        Ok(())
    }

    async fn recall(&self) -> Result<i64, ProcessingErr> {
        self.count();
        Ok(self.memory.load(Ordering::Relaxed))
    }

    async fn slow_square(
        &self,
        value: i64,
        cancel: CancellationToken,
    ) -> Result<i64, ProcessingErr> {
        self.count();
        tokio::select! {
            _ = sleep(Duration::from_millis(500)) => Ok(value * value),
            _ = cancel.cancelled() => Err(From::from("Squaring cancelled")),
        }
    }
}

async fn audit(
    calculator: Arc<PlaygroundCalculator>,
    label: &'static str,
) -> Result<(), ProcessingErr> {
    log::info!(
        "[{label}] {} operations so far, memory holds {}",
        calculator.operations.load(Ordering::Relaxed),
        calculator.memory.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Host a calculator and drive it through a proxy on a loopback channel
pub async fn run_loopback() {
    let cache = BuildCache::global();
    let host = match ServiceHost::spawn_for::<dyn Calculator>(
        TargetId::new("calculator"),
        Arc::new(PlaygroundCalculator::default()),
        cache,
    ) {
        Ok(host) => host,
        Err(err) => {
            log::error!("Failed to host the calculator: {err}");
            return;
        }
    };
    let auditor = ScheduledCallback::register(
        host.clone(),
        audit,
        "audit",
        Duration::from_millis(100),
        Some(Duration::from_millis(250)),
    );

    let proxy = match cache.get_or_build_proxy_generator::<dyn Calculator>() {
        Ok(generator) => generator.create_proxy(Arc::new(LoopbackChannel::new(host.clone()))),
        Err(err) => {
            log::error!("Failed to build the calculator proxy: {err}");
            return;
        }
    };

    match proxy.add(40, 2).await {
        Ok(sum) => log::info!("40 + 2 = {sum}"),
        Err(err) => log::error!("add failed: {err}"),
    }
    match proxy.divide(1, 0).await {
        Ok(quotient) => log::warn!("1 / 0 = {quotient}?"),
        Err(err) => log::info!("1 / 0 failed as expected: {err}"),
    }
    if let Err(err) = proxy.store(7).await {
        log::error!("store failed: {err}");
    }
    match proxy.recall().await {
        Ok(value) => log::info!("Memory recalled {value}"),
        Err(err) => log::error!("recall failed: {err}"),
    }
    match proxy.slow_square(12, CancellationToken::new()).await {
        Ok(square) => log::info!("12 squared = {square}"),
        Err(err) => log::error!("slow_square failed: {err}"),
    }

    // give the auditor a chance to interleave with the calls above
    sleep(Duration::from_millis(600)).await;
    auditor.stop();
    auditor.stopped().await;
    log::info!(
        "Auditor fired {} times, host completed {} turns",
        auditor.fire_count(),
        host.completed_turns()
    );
    host.stop_and_wait().await;
}

/// Log the registered details of the calculator hierarchy
pub fn describe() {
    let cache = BuildCache::global();
    if let Err(err) = cache.get_or_build_proxy_generator::<dyn Calculator>() {
        log::error!("Failed to build the calculator proxy: {err}");
        return;
    }
    for name in [
        <dyn Calculator as RemoteInterface>::signature().name,
        <dyn Arithmetic as RemoteInterface>::signature().name,
    ] {
        let Some(details) = cache.lookup_interface_details_by_name(name) else {
            log::warn!("'{name}' isn't registered");
            continue;
        };
        log::info!(
            "{} (id {:#010x}, {})",
            details.name,
            details.id,
            details.interface_type.rust_name()
        );
        for (id, method) in &details.methods {
            log::info!("  {method} -> {id:#010x}");
        }
        for known in &details.known_types {
            log::info!("  carries {known:?}");
        }
    }
}
