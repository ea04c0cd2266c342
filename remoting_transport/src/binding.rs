// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The binding provider: a fresh connection per call
//!
//! Each call connects, writes its request, waits for the single response and closes the
//! connection. Abandoning a call closes its connection, which the listener observes as a
//! cancellation.

use std::net::SocketAddr;

use remoting::concurrency::{deadline, CancellationToken, Duration};
use remoting::{Channel, RequestEnvelope, ResponseEnvelope, TransportErr};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::net::{connect_stream, read_frame, write_frame};
use crate::protocol::{wire_frame::Frame, WireFrame};
use crate::BindingTransportSettings;

/// A [Channel] opening a connection to a [crate::Listener] for every call
#[derive(Debug, Clone)]
pub struct BindingChannel {
    addr: SocketAddr,
    settings: BindingTransportSettings,
}

impl BindingChannel {
    /// Create a channel to the listener at `addr`. Nothing is connected until the first call
    pub fn new(addr: SocketAddr, settings: BindingTransportSettings) -> Self {
        Self { addr, settings }
    }

    /// The listener's address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn call(&self, request: RequestEnvelope) -> Result<ResponseEnvelope, TransportErr> {
        let max_message_size = self.settings.effective_max_message_size();
        let frame = WireFrame::request(0, request);
        let size = prost::Message::encoded_len(&frame);
        if size > max_message_size {
            return Err(TransportErr::MessageTooLarge {
                size,
                max: max_message_size,
            });
        }

        let open_timeout = self.settings.effective_open_timeout();
        let stream = tokio::time::timeout(
            open_timeout,
            connect_stream(self.addr, self.settings.effective_connect_timeout()),
        )
        .await
        .map_err(|_| TransportErr::ConnectTimeout(open_timeout))??;
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &frame, max_message_size).await?;

        let keep_alive = self.settings.effective_keep_alive_interval();
        let response = tokio::select! {
            response = read_response(&mut reader, max_message_size) => response?,
            err = heartbeats(&mut writer, keep_alive, max_message_size) => return Err(err),
        };

        let close_timeout = self.settings.effective_close_timeout();
        let closed = tokio::time::timeout(close_timeout, writer.shutdown())
            .await
            .map_err(|_| TransportErr::CloseTimeout(close_timeout))?;
        if let Err(err) = closed {
            // the listener may already have torn the connection down
            log::debug!("Error closing the connection to {}: '{err}'", self.addr);
        }
        response
    }
}

#[async_trait::async_trait]
impl Channel for BindingChannel {
    async fn send(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> Result<ResponseEnvelope, TransportErr> {
        if cancel.is_cancelled() {
            return Err(TransportErr::Cancelled);
        }
        let operation_timeout = self.settings.effective_operation_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportErr::Cancelled),
            _ = deadline(operation_timeout) => Err(TransportErr::OperationTimeout(
                operation_timeout.unwrap_or(Duration::MAX),
            )),
            response = self.call(request) => response,
        }
    }
}

/// Wait for the response frame, skipping heartbeats
async fn read_response(
    reader: &mut OwnedReadHalf,
    max_message_size: usize,
) -> Result<Result<ResponseEnvelope, TransportErr>, TransportErr> {
    loop {
        match read_frame(reader, max_message_size).await? {
            Some(WireFrame {
                frame: Some(Frame::Response(response)),
            }) => return Ok(response.into_envelope().1),
            Some(frame) if frame.is_heartbeat() => continue,
            Some(_) => {
                return Err(TransportErr::Protocol(
                    "Unexpected frame while awaiting a response".to_string(),
                ))
            }
            None => return Err(TransportErr::Closed),
        }
    }
}

/// Send a heartbeat every `interval` until writing fails. Never completes without an interval
async fn heartbeats(
    writer: &mut OwnedWriteHalf,
    interval: Option<Duration>,
    max_message_size: usize,
) -> TransportErr {
    loop {
        deadline(interval).await;
        if let Err(err) = write_frame(writer, &WireFrame::heartbeat(), max_message_size).await {
            return err;
        }
    }
}
