// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP transports for `remoting`.
//!
//! Two interchangeable [remoting::Channel] providers carry request envelopes to a [Listener]
//! which serves them with a [remoting::RequestHandler] (e.g. a [remoting::ServiceHost]).
//!
//! 1. [StreamChannel]: a single long-lived connection multiplexing concurrent calls, configured
//!    by [StreamTransportSettings]
//! 2. [BindingChannel]: a fresh connection per call, configured by [BindingTransportSettings]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use remoting::{remote_interface, BuildCache, ProcessingErr, ServiceHost, TargetId};
//! use remoting_transport::{Listener, StreamChannel, StreamTransportSettings};
//!
//! #[remote_interface]
//! pub trait Echo: Send + Sync {
//!     async fn echo(&self, text: String) -> Result<String, ProcessingErr>;
//! }
//!
//! struct Parrot;
//!
//! #[remoting::async_trait]
//! impl Echo for Parrot {
//!     async fn echo(&self, text: String) -> Result<String, ProcessingErr> {
//!         Ok(text)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = BuildCache::global();
//!     let host = ServiceHost::spawn_for::<dyn Echo>(TargetId::new("parrot"), Arc::new(Parrot), cache)
//!         .expect("Failed to build the dispatcher");
//!
//!     let settings = StreamTransportSettings::default();
//!     let listener = Listener::stream("127.0.0.1:0", host.clone(), &settings)
//!         .await
//!         .expect("Failed to bind the listener");
//!     let channel = StreamChannel::connect(listener.local_addr(), settings)
//!         .await
//!         .expect("Failed to connect");
//!
//!     let echo = cache
//!         .get_or_build_proxy_generator::<dyn Echo>()
//!         .expect("Failed to build the proxy")
//!         .create_proxy(Arc::new(channel));
//!     assert_eq!("polly", echo.echo("polly".to_string()).await.unwrap());
//! }
//! ```
//!
//! Every frame on the wire is a protobuf [protocol::WireFrame] prefixed by its length. See [net]
//! for the framing.

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod binding;
pub mod net;
pub mod protocol;
pub mod settings;
pub mod stream;

#[cfg(test)]
mod tests;

// re-exports
pub use binding::BindingChannel;
pub use net::listener::Listener;
pub use settings::{BindingTransportSettings, StreamTransportSettings};
pub use stream::StreamChannel;
