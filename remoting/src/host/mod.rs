// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Dispatch targets
//!
//! A [DispatchTarget] is whatever owns a live service or actor instance and decides how turns
//! on it are scheduled. Both remote requests and scheduled callbacks reach the instance through
//! [DispatchTarget::dispatch_to_target], each carrying a [MethodCallContext] naming the call and
//! its [CallOrigin].
//!
//! [ServiceHost] is the provided target: it owns one instance and processes turns one at a time
//! from a mailbox, in the manner of an actor's message loop. A call belonging to the call chain
//! currently executing on the instance is reentrant and runs immediately instead of queueing
//! behind the turn that is waiting on it.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::channel::RequestHandler;
use crate::concurrency::{
    mpsc_unbounded, oneshot, CancellationToken, JoinHandle, MpscUnboundedReceiver,
    MpscUnboundedSender, OneshotSender,
};
use crate::dispatch::{DispatcherSet, ServiceInterface};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::{BuildCache, BuildErr, DispatchErr};

#[cfg(test)]
mod tests;

/// Identifies a dispatch target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId(String);

impl TargetId {
    /// Create a target id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOrigin {
    /// Received from a caller, over a channel
    Remote,
    /// Raised internally by a scheduled callback
    Scheduled,
}

/// Names the call running on a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCallContext {
    /// The interface, or the scheduling facility, issuing the call
    pub interface: String,
    /// The method or callback being run
    pub method: String,
    /// Where the call came from
    pub origin: CallOrigin,
}

impl Display for MethodCallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({:?})", self.interface, self.method, self.origin)
    }
}

/// Runs one turn on the target instance
pub type TurnInvoker<T> =
    Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, Result<Vec<u8>, DispatchErr>> + Send>;

/// A single turn to run on a dispatch target
pub struct TargetDispatch<T: ?Sized> {
    /// The target the turn is addressed to
    pub target: TargetId,
    /// Names the call
    pub context: MethodCallContext,
    /// Whether the caller may retry the turn on a transient failure
    pub retryable: bool,
    /// Runs the turn
    pub invoker: TurnInvoker<T>,
    /// The call chain the turn belongs to
    pub correlation_id: Option<String>,
    /// Run immediately, even while another turn is executing
    pub reentrant: bool,
    /// The caller's cancellation signal
    pub cancel: CancellationToken,
}

impl<T: ?Sized> std::fmt::Debug for TargetDispatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetDispatch")
            .field("target", &self.target)
            .field("context", &self.context)
            .field("retryable", &self.retryable)
            .field("correlation_id", &self.correlation_id)
            .field("reentrant", &self.reentrant)
            .finish()
    }
}

/// Owns a live instance of `T` and schedules turns on it
#[async_trait::async_trait]
pub trait DispatchTarget<T: ?Sized>: Send + Sync + 'static {
    /// The target's identity
    fn target_id(&self) -> &TargetId;

    /// Run a turn on the target, under the target's concurrency discipline
    ///
    /// Returns [Err(DispatchErr::TargetGone)] when the target no longer exists
    async fn dispatch_to_target(
        &self,
        dispatch: TargetDispatch<T>,
    ) -> Result<Vec<u8>, DispatchErr>;
}

struct Turn<T: ?Sized> {
    dispatch: TargetDispatch<T>,
    reply: OneshotSender<Result<Vec<u8>, DispatchErr>>,
}

#[derive(Default)]
struct HostState {
    stopped: AtomicBool,
    active_chain: Mutex<Option<String>>,
    turns: AtomicU64,
}

/// Hosts one instance of `T`, processing its turns one at a time
pub struct ServiceHost<T: ?Sized> {
    id: TargetId,
    target: Arc<T>,
    dispatchers: Arc<DispatcherSet<T>>,
    mailbox: MpscUnboundedSender<Turn<T>>,
    state: Arc<HostState>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: ?Sized + Send + Sync + 'static> ServiceHost<T> {
    /// Start hosting `target`, serving the interfaces routed by `dispatchers`
    pub fn spawn(
        id: TargetId,
        target: Arc<T>,
        dispatchers: Arc<DispatcherSet<T>>,
    ) -> Arc<Self> {
        let (mailbox, rx) = mpsc_unbounded();
        let state = Arc::new(HostState::default());
        let shutdown = CancellationToken::new();
        let handle = crate::concurrency::spawn(Self::processing_loop(
            id.clone(),
            target.clone(),
            rx,
            state.clone(),
            shutdown.clone(),
        ));
        log::info!("Service host '{id}' started");
        Arc::new(Self {
            id,
            target,
            dispatchers,
            mailbox,
            state,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Start hosting `target`, serving the interface `I` and its ancestors with the
    /// dispatchers of `cache`
    pub fn spawn_for<I>(
        id: TargetId,
        target: Arc<T>,
        cache: &BuildCache,
    ) -> Result<Arc<Self>, BuildErr>
    where
        I: ServiceInterface<T> + ?Sized,
    {
        let dispatchers = cache.get_or_build_dispatcher::<I, T>()?;
        Ok(Self::spawn(id, target, dispatchers))
    }

    async fn processing_loop(
        id: TargetId,
        target: Arc<T>,
        mut rx: MpscUnboundedReceiver<Turn<T>>,
        state: Arc<HostState>,
        shutdown: CancellationToken,
    ) {
        loop {
            let turn = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                turn = rx.recv() => turn,
            };
            let Some(Turn { dispatch, reply }) = turn else {
                break;
            };

            log::debug!("'{id}' processing {}", dispatch.context);
            *state.active_chain.lock() = dispatch.correlation_id.clone();
            // a turn already running always completes, even when a stop arrives meanwhile
            let result = (dispatch.invoker)(target.clone()).await;
            *state.active_chain.lock() = None;
            state.turns.fetch_add(1, Ordering::Relaxed);

            let _ = reply.send(result);
        }
        state.stopped.store(true, Ordering::Release);
        log::info!("Service host '{id}' stopped");
    }

    /// The dispatchers this host routes requests with
    pub fn dispatchers(&self) -> &Arc<DispatcherSet<T>> {
        &self.dispatchers
    }

    /// The number of turns completed through the mailbox
    pub fn completed_turns(&self) -> u64 {
        self.state.turns.load(Ordering::Relaxed)
    }

    /// Whether the host no longer accepts turns
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled() || self.state.stopped.load(Ordering::Acquire)
    }

    /// Stop the host. A turn already executing runs to completion, queued turns fail with
    /// [DispatchErr::TargetGone]
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Stop the host and wait for its processing loop to exit
    pub async fn stop_and_wait(&self) {
        self.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn is_reentrant(&self, dispatch: &TargetDispatch<T>) -> bool {
        if dispatch.reentrant {
            return true;
        }
        match (&dispatch.correlation_id, &*self.state.active_chain.lock()) {
            (Some(incoming), Some(active)) => incoming == active,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl<T: ?Sized + Send + Sync + 'static> DispatchTarget<T> for ServiceHost<T> {
    fn target_id(&self) -> &TargetId {
        &self.id
    }

    async fn dispatch_to_target(
        &self,
        dispatch: TargetDispatch<T>,
    ) -> Result<Vec<u8>, DispatchErr> {
        if self.is_stopped() || dispatch.target != self.id {
            return Err(DispatchErr::TargetGone(dispatch.target));
        }

        if self.is_reentrant(&dispatch) {
            log::debug!("'{}' running reentrant {}", self.id, dispatch.context);
            return (dispatch.invoker)(self.target.clone()).await;
        }

        let (reply, rx) = oneshot();
        let target = dispatch.target.clone();
        self.mailbox
            .send(Turn { dispatch, reply })
            .map_err(|_| DispatchErr::TargetGone(target.clone()))?;
        // the reply is dropped when the host stops before running the turn
        rx.await.map_err(|_| DispatchErr::TargetGone(target))?
    }
}

#[async_trait::async_trait]
impl<T: ?Sized + Send + Sync + 'static> RequestHandler for ServiceHost<T> {
    async fn handle_request(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> ResponseEnvelope {
        let RequestEnvelope {
            interface_id,
            method_id,
            arguments,
            correlation_id,
        } = request;
        let call = match self
            .dispatchers
            .prepare(interface_id, method_id, arguments)
        {
            Ok(call) => call,
            Err(err) => {
                log::warn!("'{}' rejected request: {err}", self.id);
                return ResponseEnvelope::from(Err(err));
            }
        };

        let context = MethodCallContext {
            interface: call.interface_name().to_string(),
            method: call.method().name.to_string(),
            origin: CallOrigin::Remote,
        };
        let turn_cancel = cancel.clone();
        let dispatch = TargetDispatch {
            target: self.id.clone(),
            context,
            retryable: false,
            invoker: Box::new(move |target| call.invoke(target, turn_cancel).boxed()),
            correlation_id,
            reentrant: false,
            cancel,
        };
        ResponseEnvelope::from(self.dispatch_to_target(dispatch).await)
    }
}

impl<T: ?Sized> Drop for ServiceHost<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
