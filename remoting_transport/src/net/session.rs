// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The serving side of a single TCP connection
//!
//! A session is split into a reader loop and a writer task. The reader decodes frames and hands
//! every request to the [RequestHandler] on its own task, so calls on one connection run
//! concurrently. Responses funnel back through the writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use remoting::concurrency::{mpsc_unbounded, CancellationToken, MpscUnboundedReceiver};
use remoting::{RemoteFailure, RequestHandler, ResponseEnvelope, ResponseFault};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

use super::{read_frame, write_frame};
use crate::protocol::{wire_frame::Frame, WireFrame};

/// How many requests a session serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionMode {
    /// Any number of concurrent requests, until the peer disconnects
    Multiplexed,
    /// A single request, after which the session closes its side of the connection
    SingleRequest,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionConfig {
    pub(crate) max_message_size: usize,
    pub(crate) mode: SessionMode,
}

/// Serve the connection until the peer disconnects or `shutdown` is signalled
pub(crate) async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (mut reader, writer) = stream.into_split();
    let (outbound, rx) = mpsc_unbounded();
    remoting::concurrency::spawn(write_loop(writer, rx, peer_addr, config));

    let in_flight: Arc<DashMap<u64, CancellationToken>> = Arc::new(DashMap::new());
    let mut served = 0usize;
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = read_frame(&mut reader, config.max_message_size) => frame,
        };
        let frame = match frame {
            Ok(Some(WireFrame { frame: Some(frame) })) => frame,
            Ok(Some(_)) => {
                log::warn!("Empty frame received from {peer_addr}. Discarding");
                continue;
            }
            Ok(None) => {
                log::debug!("{peer_addr} closed the connection");
                break;
            }
            Err(err) => {
                log::error!("Error reading from {peer_addr}: '{err}'. Closing the session");
                break;
            }
        };

        match frame {
            Frame::Request(request) => {
                if config.mode == SessionMode::SingleRequest && served > 0 {
                    log::warn!("{peer_addr} sent a second request on a single-request session");
                    continue;
                }
                served += 1;

                let (request_id, envelope) = request.into_envelope();
                let cancel = CancellationToken::new();
                in_flight.insert(request_id, cancel.clone());

                let handler = handler.clone();
                let in_flight = in_flight.clone();
                let outbound = outbound.clone();
                let max_message_size = config.max_message_size;
                remoting::concurrency::spawn(async move {
                    let interface_id = envelope.interface_id;
                    let method_id = envelope.method_id;
                    let response = handler.handle_request(envelope, cancel).await;
                    in_flight.remove(&request_id);

                    let mut frame = WireFrame::response(request_id, response);
                    let size = prost::Message::encoded_len(&frame);
                    if size > max_message_size {
                        let failure = RemoteFailure {
                            interface: interface_id.to_string(),
                            method: method_id.to_string(),
                            message: format!(
                                "Response of {size} bytes exceeds the {max_message_size} byte limit"
                            ),
                        };
                        frame = WireFrame::response(
                            request_id,
                            ResponseEnvelope::fault(ResponseFault::Failed(failure)),
                        );
                    }
                    let _ = outbound.send(frame);
                });
            }
            Frame::Cancel(cancel) => {
                if let Some((_, token)) = in_flight.remove(&cancel.request_id) {
                    log::debug!("{peer_addr} cancelled request {}", cancel.request_id);
                    token.cancel();
                }
            }
            Frame::Heartbeat(_) => {
                let _ = outbound.send(WireFrame::heartbeat());
            }
            Frame::Response(response) => {
                log::warn!(
                    "Unexpected response {} received from {peer_addr}. Discarding",
                    response.request_id
                );
            }
        }
    }

    // nobody is left to receive the outstanding responses
    for entry in in_flight.iter() {
        entry.value().cancel();
    }
    log::info!("TCP Session closed for {peer_addr}");
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: MpscUnboundedReceiver<WireFrame>,
    peer_addr: SocketAddr,
    config: SessionConfig,
) {
    while let Some(frame) = rx.recv().await {
        let is_response = matches!(frame.frame, Some(Frame::Response(_)));
        if let Err(err) = write_frame(&mut writer, &frame, config.max_message_size).await {
            log::warn!("Error writing to {peer_addr}: '{err}'");
            break;
        }
        if is_response && config.mode == SessionMode::SingleRequest {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
