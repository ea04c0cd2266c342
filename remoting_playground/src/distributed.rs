// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The calculator served over TCP, with the client in a separate process

use std::net::SocketAddr;
use std::sync::Arc;

use remoting::{BuildCache, Channel, ServiceHost, TargetId};
use remoting_transport::{
    BindingChannel, BindingTransportSettings, Listener, StreamChannel, StreamTransportSettings,
};

use crate::calculator::{Arithmetic, Calculator, PlaygroundCalculator};

/// Serve a calculator on `port` until Ctrl-C is received
pub async fn serve(port: u16, binding: bool) {
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

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = if binding {
        Listener::binding(addr, host.clone(), &BindingTransportSettings::default()).await
    } else {
        Listener::stream(addr, host.clone(), &StreamTransportSettings::default()).await
    };
    let listener = match listener {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("Failed to listen on {addr}: {err}");
            host.stop_and_wait().await;
            return;
        }
    };

    // wait for exit
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed waiting for Ctrl-C: {err}");
    }
    listener.shutdown_and_wait().await;
    log::info!(
        "Served {} connections, {} turns",
        listener.sessions_opened(),
        host.completed_turns()
    );
    host.stop_and_wait().await;
}

/// Call the calculator served on `port`
pub async fn call(port: u16, left: i64, right: i64, binding: bool) {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let channel: Arc<dyn Channel> = if binding {
        Arc::new(BindingChannel::new(addr, BindingTransportSettings::default()))
    } else {
        match StreamChannel::connect(addr, StreamTransportSettings::default()).await {
            Ok(channel) => Arc::new(channel),
            Err(err) => {
                log::error!("Failed to connect to {addr}: {err}");
                return;
            }
        }
    };

    let proxy = match BuildCache::global().get_or_build_proxy_generator::<dyn Calculator>() {
        Ok(generator) => generator.create_proxy(channel),
        Err(err) => {
            log::error!("Failed to build the calculator proxy: {err}");
            return;
        }
    };

    match proxy.add(left, right).await {
        Ok(sum) => log::info!("{left} + {right} = {sum}"),
        Err(err) => log::error!("add failed: {err}"),
    }
    match proxy.divide(left, right).await {
        Ok(quotient) => log::info!("{left} / {right} = {quotient}"),
        Err(err) => log::error!("divide failed: {err}"),
    }
    if let Err(err) = proxy.store(left).await {
        log::error!("store failed: {err}");
    }
    match proxy.recall().await {
        Ok(value) => log::info!("The server's memory holds {value}"),
        Err(err) => log::error!("recall failed: {err}"),
    }
}
