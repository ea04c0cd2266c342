// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP framing, the listener and its sessions
//!
//! Every frame is written as 2 parts: exactly 8 bytes holding the length of the payload (u64 in
//! big endian format), followed by the protobuf encoded [WireFrame]. Frames larger than the
//! configured maximum are refused on both sides.

use bytes::Bytes;
use prost::Message;
use remoting::concurrency::Duration;
use remoting::TransportErr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ErrorKind};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::WireFrame;

pub mod listener;
pub(crate) mod session;


/// Encode `frame` length prefixed and write it out
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    frame: &WireFrame,
    max_message_size: usize,
) -> Result<(), TransportErr>
where
    W: AsyncWrite + Unpin,
{
    let len = frame.encoded_len();
    if len > max_message_size {
        return Err(TransportErr::MessageTooLarge {
            size: len,
            max: max_message_size,
        });
    }
    let mut buf: Vec<u8> = Vec::with_capacity(len + std::mem::size_of::<u64>());
    buf.extend_from_slice(&(len as u64).to_be_bytes());
    frame
        .encode(&mut buf)
        .map_err(|err| TransportErr::Protocol(err.to_string()))?;
    log::trace!("Writing payload (len={len})");
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame. Returns [None] when the peer closed the stream between frames
///
/// Not cancel-safe, a partially read frame is lost when the future is dropped
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_message_size: usize,
) -> Result<Option<WireFrame>, TransportErr>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u64().await {
        Ok(len) => len,
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > max_message_size as u64 {
        return Err(TransportErr::MessageTooLarge {
            size: len as usize,
            max: max_message_size,
        });
    }
    log::trace!("Payload length message ({len}) received");

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    WireFrame::decode(Bytes::from(buf))
        .map(Some)
        .map_err(|err| TransportErr::Protocol(err.to_string()))
}

/// Connect a TCP stream within `timeout`
pub(crate) async fn connect_stream<A>(addr: A, timeout: Duration) -> Result<TcpStream, TransportErr>
where
    A: ToSocketAddrs,
{
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportErr::ConnectTimeout(timeout))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}
