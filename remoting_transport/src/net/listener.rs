// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP Server to accept incoming sessions

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use remoting::concurrency::{CancellationToken, JoinHandle};
use remoting::{RequestHandler, TransportErr};
use tokio::net::{TcpListener, ToSocketAddrs};

use super::session::{run_session, SessionConfig, SessionMode};
use crate::{BindingTransportSettings, StreamTransportSettings};

/// A Tcp Socket [Listener] responsible for accepting new connections and serving the requests
/// they carry with a [RequestHandler].
///
/// Each accepted connection is served by its own session. Shutting the listener down (or
/// dropping it) stops accepting and closes every open session.
pub struct Listener {
    local_addr: SocketAddr,
    sessions: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Listen for [crate::StreamChannel]s, serving any number of concurrent calls per connection
    pub async fn stream<A>(
        addr: A,
        handler: Arc<dyn RequestHandler>,
        settings: &StreamTransportSettings,
    ) -> Result<Self, TransportErr>
    where
        A: ToSocketAddrs,
    {
        let config = SessionConfig {
            max_message_size: settings.effective_max_message_size(),
            mode: SessionMode::Multiplexed,
        };
        Self::bind(addr, handler, config).await
    }

    /// Listen for [crate::BindingChannel]s, serving a single call per connection
    pub async fn binding<A>(
        addr: A,
        handler: Arc<dyn RequestHandler>,
        settings: &BindingTransportSettings,
    ) -> Result<Self, TransportErr>
    where
        A: ToSocketAddrs,
    {
        let config = SessionConfig {
            max_message_size: settings.effective_max_message_size(),
            mode: SessionMode::SingleRequest,
        };
        Self::bind(addr, handler, config).await
    }

    async fn bind<A>(
        addr: A,
        handler: Arc<dyn RequestHandler>,
        config: SessionConfig,
    ) -> Result<Self, TransportErr>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let sessions = Arc::new(AtomicUsize::new(0));

        let handle = remoting::concurrency::spawn(Self::accept_loop(
            listener,
            handler,
            config,
            sessions.clone(),
            shutdown.clone(),
        ));
        log::info!("Listening on {local_addr} ({:?})", config.mode);

        Ok(Self {
            local_addr,
            sessions,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        handler: Arc<dyn RequestHandler>,
        config: SessionConfig,
        sessions: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        log::warn!("Failed to disable Nagle's algorithm for {addr}: '{err}'");
                    }
                    sessions.fetch_add(1, Ordering::Relaxed);
                    log::info!("TCP Session opened for {addr}");
                    remoting::concurrency::spawn(run_session(
                        stream,
                        addr,
                        handler.clone(),
                        config,
                        shutdown.clone(),
                    ));
                }
                Err(socket_accept_error) => {
                    log::warn!("Error accepting socket {socket_accept_error}");
                }
            }
        }
    }

    /// The bound address, with the port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The number of connections accepted so far
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Stop accepting connections and close every open session
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Shut down and wait for the accept loop to exit
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        log::info!("Listener on {} stopped", self.local_addr);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
