// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Scheduled callbacks
//!
//! A [ScheduledCallback] periodically re-enters a [DispatchTarget] to run a user callback on the
//! target's instance. Each fire is dispatched like any other turn, tagged with
//! [CallOrigin::Scheduled], so it queues behind (and is serialized with) the remote calls the
//! target is processing.
//!
//! The timer moves `Armed -> Firing -> Armed` while fires succeed. A fire failing because the
//! target no longer exists stops the timer for good. Any other failure is logged and the timer
//! rearms on its regular period.
//!
//! Stopping is idempotent and only prevents future fires, a fire already executing always runs to
//! completion. Dropping the [ScheduledCallback] handle stops the timer.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use remoting::concurrency::Duration;
//! use remoting::{DispatchTarget, ProcessingErr, ScheduledCallback};
//!
//! struct Inventory;
//!
//! async fn restock(_inventory: Arc<Inventory>, amount: u32) -> Result<(), ProcessingErr> {
//!     println!("Restocking {amount}");
//!     Ok(())
//! }
//!
//! fn schedule(target: Arc<dyn DispatchTarget<Inventory>>) -> ScheduledCallback {
//!     ScheduledCallback::register(
//!         target,
//!         restock,
//!         10,
//!         Duration::from_millis(100),
//!         Some(Duration::from_secs(1)),
//!     )
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;

use crate::concurrency::{CancellationToken, Duration, JoinHandle};
use crate::dispatch::{run_guarded, InvocationErr};
use crate::host::{CallOrigin, DispatchTarget, MethodCallContext, TargetDispatch, TargetId};
use crate::ProcessingErr;

#[cfg(test)]
mod tests;

const SCHEDULER: &str = "ScheduledCallback";

const ARMED: u8 = 0;
const FIRING: u8 = 1;
const CANCELLED: u8 = 2;

/// The state of a [ScheduledCallback]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting for the next fire
    Armed,
    /// A fire is executing
    Firing,
    /// No further fires will occur
    Cancelled,
}

impl TimerState {
    fn from_u8(value: u8) -> Self {
        match value {
            ARMED => Self::Armed,
            FIRING => Self::Firing,
            _ => Self::Cancelled,
        }
    }
}

struct TimerInner {
    name: String,
    target: TargetId,
    state: AtomicU8,
    fires: AtomicUsize,
    stop: CancellationToken,
}

impl TimerInner {
    fn cancel(&self) -> bool {
        let previous = self.state.swap(CANCELLED, Ordering::AcqRel);
        self.stop.cancel();
        previous != CANCELLED
    }

    /// Wait `dur`, returning false if the timer was stopped meanwhile
    async fn sleep(&self, dur: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            _ = crate::concurrency::sleep(dur) => !self.stop.is_cancelled(),
        }
    }
}

/// A timer delivering a callback to a dispatch target on a schedule
pub struct ScheduledCallback {
    inner: Arc<TimerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledCallback {
    /// Register a callback against a live target
    ///
    /// * `target` - The target the callback runs on
    /// * `callback` - Called with the target instance and a clone of `state` on each fire
    /// * `state` - The user state handed to every fire
    /// * `due` - The delay before the first fire
    /// * `period` - The delay between fires, [None] to fire once
    pub fn register<D, T, S, F, Fut>(
        target: Arc<D>,
        callback: F,
        state: S,
        due: Duration,
        period: Option<Duration>,
    ) -> Self
    where
        D: DispatchTarget<T> + ?Sized,
        T: ?Sized + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(Arc<T>, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingErr>> + Send + 'static,
    {
        let inner = Arc::new(TimerInner {
            name: callback_name::<F>(),
            target: target.target_id().clone(),
            state: AtomicU8::new(ARMED),
            fires: AtomicUsize::new(0),
            stop: CancellationToken::new(),
        });
        log::debug!(
            "Scheduled callback '{}' registered on '{}'",
            inner.name,
            inner.target
        );

        let handle = crate::concurrency::spawn(Self::run(
            inner.clone(),
            target,
            Arc::new(callback),
            state,
            due,
            period,
        ));
        Self {
            inner,
            handle: Mutex::new(Some(handle)),
        }
    }

    async fn run<D, T, S, F, Fut>(
        inner: Arc<TimerInner>,
        target: Arc<D>,
        callback: Arc<F>,
        state: S,
        due: Duration,
        period: Option<Duration>,
    ) where
        D: DispatchTarget<T> + ?Sized,
        T: ?Sized + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(Arc<T>, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingErr>> + Send + 'static,
    {
        if !inner.sleep(due).await {
            return;
        }

        loop {
            if inner
                .state
                .compare_exchange(ARMED, FIRING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
            inner.fires.fetch_add(1, Ordering::AcqRel);

            let dispatch = TargetDispatch {
                target: inner.target.clone(),
                context: MethodCallContext {
                    interface: SCHEDULER.to_string(),
                    method: inner.name.clone(),
                    origin: CallOrigin::Scheduled,
                },
                retryable: false,
                invoker: Self::invoker(inner.name.clone(), callback.clone(), state.clone()),
                correlation_id: None,
                reentrant: false,
                cancel: CancellationToken::new(),
            };

            match target.dispatch_to_target(dispatch).await {
                Ok(_) => {}
                Err(err) if err.is_target_gone() => {
                    log::info!(
                        "Scheduled callback '{}' stopping, target '{}' no longer exists",
                        inner.name,
                        inner.target
                    );
                    inner.cancel();
                    break;
                }
                Err(err) => {
                    log::warn!(
                        "Scheduled callback '{}' on '{}' failed: {err}",
                        inner.name,
                        inner.target
                    );
                }
            }

            let Some(period) = period else {
                inner.cancel();
                break;
            };
            // fails when the timer was stopped during the fire
            if inner
                .state
                .compare_exchange(FIRING, ARMED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
            if !inner.sleep(period).await {
                break;
            }
        }
    }

    fn invoker<T, S, F, Fut>(
        name: String,
        callback: Arc<F>,
        state: S,
    ) -> crate::host::TurnInvoker<T>
    where
        T: ?Sized + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(Arc<T>, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingErr>> + Send + 'static,
    {
        Box::new(move |instance| {
            async move {
                let fire = async move {
                    callback(instance, state)
                        .await
                        .map(|_| vec![])
                        .map_err(InvocationErr::Failed)
                };
                run_guarded(SCHEDULER, &name, fire).await
            }
            .boxed()
        })
    }

    /// Stop future fires. Idempotent, and a fire already executing runs to completion
    pub fn stop(&self) {
        if self.inner.cancel() {
            log::debug!(
                "Scheduled callback '{}' on '{}' stopped",
                self.inner.name,
                self.inner.target
            );
        }
    }

    /// Wait for the timer's task to exit. Only completes once the timer is cancelled
    pub async fn stopped(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// The timer's current state
    pub fn state(&self) -> TimerState {
        TimerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The number of fires started so far
    pub fn fire_count(&self) -> usize {
        self.inner.fires.load(Ordering::Acquire)
    }

    /// The callback's name, derived from the callback function
    pub fn callback_name(&self) -> &str {
        &self.inner.name
    }

    /// The target the callback runs on
    pub fn target_id(&self) -> &TargetId {
        &self.inner.target
    }
}

impl Drop for ScheduledCallback {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl std::fmt::Debug for ScheduledCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledCallback")
            .field("name", &self.inner.name)
            .field("target", &self.inner.target)
            .field("state", &self.state())
            .finish()
    }
}

/// The last path segment of the callback's type, skipping closure segments
pub(crate) fn callback_name<F>() -> String {
    let full = std::any::type_name::<F>();
    full.split("::")
        .filter(|segment| !segment.starts_with("{{"))
        .last()
        .unwrap_or(full)
        .to_string()
}
