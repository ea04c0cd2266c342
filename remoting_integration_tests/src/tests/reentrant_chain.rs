// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Bounce a single call chain between two hosts served over TCP.
//!
//! "ping" and "pong" each hold a proxy to the other, joined to the same call chain. A bounce
//! with `hops` remaining forwards `hops - 1` to the peer, so every host is re-entered while its
//! previous turn of the chain is still waiting on the peer. Without reentrancy the chain
//! deadlocks and the test fails by timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;
use remoting::concurrency::{Duration, Instant};
use remoting::{remote_interface, BuildCache, ProcessingErr, ServiceHost, TargetId};
use remoting_transport::{Listener, StreamChannel, StreamTransportSettings};
use tokio::sync::OnceCell;

const CHAIN: &str = "integration-chain";
const CHAIN_ALLOTED_MS: u64 = 3000;

#[remote_interface(name = "integration.Relay")]
trait Relay: Send + Sync {
    async fn bounce(&self, hops: u32) -> Result<u32, ProcessingErr>;
}

struct ChainRelay {
    name: &'static str,
    peer: OnceCell<Arc<dyn Relay>>,
}

#[remoting::async_trait]
impl Relay for ChainRelay {
    async fn bounce(&self, hops: u32) -> Result<u32, ProcessingErr> {
        log::debug!("'{}' bouncing with {hops} hops remaining", self.name);
        if hops == 0 {
            return Ok(0);
        }
        let peer = self
            .peer
            .get()
            .ok_or_else(|| format!("'{}' has no peer", self.name))?;
        Ok(peer.bounce(hops - 1).await? + 1)
    }
}

/// Configuration
#[derive(Args, Debug, Clone)]
pub struct ReentrantChainConfig {
    /// The number of hops to bounce through
    #[arg(default_value_t = 10)]
    hops: u32,
}

struct Node {
    relay: Arc<ChainRelay>,
    host: Arc<ServiceHost<ChainRelay>>,
    listener: Listener,
}

impl Node {
    async fn start(name: &'static str) -> Result<Self, ProcessingErr> {
        let relay = Arc::new(ChainRelay {
            name,
            peer: OnceCell::new(),
        });
        let host = ServiceHost::spawn_for::<dyn Relay>(
            TargetId::new(name),
            relay.clone(),
            BuildCache::global(),
        )?;
        let listener = Listener::stream(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            host.clone(),
            &StreamTransportSettings::default(),
        )
        .await?;
        Ok(Self {
            relay,
            host,
            listener,
        })
    }

    async fn chained_proxy(&self) -> Result<Arc<dyn Relay>, ProcessingErr> {
        let channel =
            StreamChannel::connect(self.listener.local_addr(), StreamTransportSettings::default())
                .await?;
        Ok(BuildCache::global()
            .get_or_build_proxy_generator::<dyn Relay>()?
            .create_proxy_in_chain(Arc::new(channel), CHAIN))
    }

    async fn stop(self) {
        self.listener.shutdown_and_wait().await;
        self.host.stop_and_wait().await;
    }
}

async fn bounce(hops: u32) -> Result<(u32, Node, Node), ProcessingErr> {
    let ping = Node::start("ping").await?;
    let pong = Node::start("pong").await?;
    if ping.relay.peer.set(pong.chained_proxy().await?).is_err()
        || pong.relay.peer.set(ping.chained_proxy().await?).is_err()
    {
        return Err(From::from("Relay peers were already wired"));
    }

    let entry = ping.chained_proxy().await?;
    let result = tokio::time::timeout(
        Duration::from_millis(CHAIN_ALLOTED_MS),
        entry.bounce(hops),
    )
    .await
    .map_err(|_| format!("The chain didn't complete in {CHAIN_ALLOTED_MS}ms"))??;
    Ok((result, ping, pong))
}

pub(crate) async fn test(config: ReentrantChainConfig) -> i32 {
    let tic = Instant::now();
    match bounce(config.hops).await {
        Ok((result, ping, pong)) => {
            let code = if result == config.hops {
                log::info!(
                    "The chain bounced {result} times in {}ms ({} + {} turns)",
                    tic.elapsed().as_millis(),
                    ping.host.completed_turns(),
                    pong.host.completed_turns()
                );
                0
            } else {
                log::error!("Expected {} hops, counted {result}", config.hops);
                -1
            };
            ping.stop().await;
            pong.stop().await;
            code
        }
        Err(err) => {
            log::error!("The chain failed with error {err}");
            -1
        }
    }
}
