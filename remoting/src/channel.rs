// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The transport seam between proxies and dispatchers
//!
//! A proxy sends every call through a [Channel]. Transport providers implement [Channel] on the
//! calling side and drive a [RequestHandler] on the receiving side. The [LoopbackChannel] connects
//! the two directly in-process.

use std::sync::Arc;

use crate::concurrency::CancellationToken;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::TransportErr;

/// Carries request envelopes to a remote target and returns its responses
#[async_trait::async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Send a request and wait for its response
    ///
    /// * `request` - The call to deliver
    /// * `cancel` - Cancelled when the caller abandons the call
    async fn send(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> Result<ResponseEnvelope, TransportErr>;
}

/// Receives request envelopes on the serving side of a channel
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Process a request, always producing a response
    async fn handle_request(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> ResponseEnvelope;
}

/// An in-process channel delivering requests straight to a [RequestHandler]
#[derive(Clone)]
pub struct LoopbackChannel {
    handler: Arc<dyn RequestHandler>,
}

impl LoopbackChannel {
    /// Connect directly to `handler`
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait::async_trait]
impl Channel for LoopbackChannel {
    async fn send(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> Result<ResponseEnvelope, TransportErr> {
        if cancel.is_cancelled() {
            return Err(TransportErr::Cancelled);
        }
        tokio::select! {
            response = self.handler.handle_request(request, cancel.clone()) => Ok(response),
            _ = cancel.cancelled() => Err(TransportErr::Cancelled),
        }
    }
}
