// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The streaming provider: one long-lived connection multiplexing every call
//!
//! Calls are correlated with their responses by a per-connection request id. A call abandoned
//! through cancellation or its operation timeout drops its correlation slot locally and tells the
//! listener to cancel it, a late response is then discarded.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use remoting::concurrency::{
    deadline, mpsc_unbounded, oneshot, CancellationToken, Duration, JoinHandle,
    MpscUnboundedReceiver, MpscUnboundedSender, OneshotSender,
};
use remoting::{Channel, RequestEnvelope, ResponseEnvelope, TransportErr};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::ToSocketAddrs;
use tokio::sync::Semaphore;

use crate::net::{connect_stream, read_frame, write_frame};
use crate::protocol::{wire_frame::Frame, WireFrame};
use crate::StreamTransportSettings;

type PendingCalls = DashMap<u64, OneshotSender<Result<ResponseEnvelope, TransportErr>>>;

/// A [Channel] multiplexing calls over a single TCP connection to a [crate::Listener]
pub struct StreamChannel {
    settings: StreamTransportSettings,
    peer_addr: SocketAddr,
    outbound: MpscUnboundedSender<WireFrame>,
    pending: Arc<PendingCalls>,
    next_request: AtomicU64,
    in_flight: Semaphore,
    closed: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamChannel {
    /// Connect to a listener, completing a heartbeat handshake within the open timeout
    pub async fn connect<A>(addr: A, settings: StreamTransportSettings) -> Result<Self, TransportErr>
    where
        A: ToSocketAddrs,
    {
        let open_timeout = settings.effective_open_timeout();
        match tokio::time::timeout(open_timeout, Self::open(addr, settings)).await {
            Ok(channel) => channel,
            Err(_) => Err(TransportErr::ConnectTimeout(open_timeout)),
        }
    }

    async fn open<A>(addr: A, settings: StreamTransportSettings) -> Result<Self, TransportErr>
    where
        A: ToSocketAddrs,
    {
        let max_message_size = settings.effective_max_message_size();
        let stream = connect_stream(addr, settings.effective_connect_timeout()).await?;
        let peer_addr = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();

        write_frame(&mut writer, &WireFrame::heartbeat(), max_message_size).await?;
        match read_frame(&mut reader, max_message_size).await? {
            Some(frame) if frame.is_heartbeat() => {}
            Some(_) => {
                return Err(TransportErr::Protocol(
                    "Expected a heartbeat acknowledging the connection".to_string(),
                ))
            }
            None => return Err(TransportErr::Closed),
        }

        let (outbound, rx) = mpsc_unbounded();
        let pending = Arc::new(PendingCalls::new());
        let closed = CancellationToken::new();
        let write_task = remoting::concurrency::spawn(write_loop(
            writer,
            rx,
            peer_addr,
            settings.effective_keep_alive_interval(),
            max_message_size,
            closed.clone(),
        ));
        let read_task = remoting::concurrency::spawn(read_loop(
            reader,
            pending.clone(),
            peer_addr,
            max_message_size,
            closed.clone(),
        ));
        log::info!("Stream channel connected to {peer_addr}");

        Ok(Self {
            in_flight: Semaphore::new(settings.effective_max_concurrent_calls()),
            settings,
            peer_addr,
            outbound,
            pending,
            next_request: AtomicU64::new(1),
            closed,
            tasks: Mutex::new(vec![write_task, read_task]),
        })
    }

    /// The listener's address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Determine if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// The number of calls awaiting their response
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Close the connection, failing every pending call with [TransportErr::Closed]
    pub async fn close(&self) -> Result<(), TransportErr> {
        self.closed.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let close_timeout = self.settings.effective_close_timeout();
        tokio::time::timeout(close_timeout, async move {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await
        .map_err(|_| TransportErr::CloseTimeout(close_timeout))?;
        log::info!("Stream channel to {} closed", self.peer_addr);
        Ok(())
    }

    fn abandon(&self, request_id: u64) {
        if self.pending.remove(&request_id).is_some() {
            let _ = self.outbound.send(WireFrame::cancel(request_id));
        }
    }
}

#[async_trait::async_trait]
impl Channel for StreamChannel {
    async fn send(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> Result<ResponseEnvelope, TransportErr> {
        if self.closed.is_cancelled() {
            return Err(TransportErr::Closed);
        }
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportErr::Cancelled),
            permit = self.in_flight.acquire() => permit.map_err(|_| TransportErr::Closed)?,
        };

        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let frame = WireFrame::request(request_id, request);
        let max_message_size = self.settings.effective_max_message_size();
        let size = prost::Message::encoded_len(&frame);
        if size > max_message_size {
            return Err(TransportErr::MessageTooLarge {
                size,
                max: max_message_size,
            });
        }

        let (tx, rx) = oneshot();
        self.pending.insert(request_id, tx);
        // the reader marks the channel closed before it drains the pending calls
        if self.closed.is_cancelled() || self.outbound.send(frame).is_err() {
            self.pending.remove(&request_id);
            return Err(TransportErr::Closed);
        }

        let operation_timeout = self.settings.effective_operation_timeout();
        let result = tokio::select! {
            biased;
            reply = rx => reply.unwrap_or(Err(TransportErr::Closed)),
            _ = cancel.cancelled() => Err(TransportErr::Cancelled),
            _ = deadline(operation_timeout) => Err(TransportErr::OperationTimeout(
                operation_timeout.unwrap_or(Duration::MAX),
            )),
        };
        if matches!(
            result,
            Err(TransportErr::Cancelled) | Err(TransportErr::OperationTimeout(_))
        ) {
            self.abandon(request_id);
        }
        result
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: MpscUnboundedReceiver<WireFrame>,
    peer_addr: SocketAddr,
    keep_alive: Duration,
    max_message_size: usize,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = remoting::concurrency::sleep(keep_alive) => WireFrame::heartbeat(),
        };
        if let Err(err) = write_frame(&mut writer, &frame, max_message_size).await {
            log::warn!("Error writing to {peer_addr}: '{err}'");
            closed.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Arc<PendingCalls>,
    peer_addr: SocketAddr,
    max_message_size: usize,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = read_frame(&mut reader, max_message_size) => frame,
        };
        match frame {
            Ok(Some(WireFrame {
                frame: Some(Frame::Response(response)),
            })) => {
                let (request_id, response) = response.into_envelope();
                if let Err(err) = &response {
                    log::error!("Error decoding response {request_id}: '{err}'");
                }
                match pending.remove(&request_id) {
                    Some((_, reply)) => {
                        let _ = reply.send(response);
                    }
                    None => log::debug!("Discarding response to abandoned request {request_id}"),
                }
            }
            Ok(Some(frame)) if frame.is_heartbeat() => {
                log::trace!("Heartbeat received from {peer_addr}");
            }
            Ok(Some(_)) => {
                log::warn!("Unexpected frame received from {peer_addr}. Discarding");
            }
            Ok(None) => {
                log::info!("{peer_addr} closed the connection");
                break;
            }
            Err(err) => {
                log::error!("Error reading from {peer_addr}: '{err}'. Closing the connection");
                break;
            }
        }
    }
    closed.cancel();
    // dropping the reply senders fails every pending call with `Closed`
    pending.clear();
}
