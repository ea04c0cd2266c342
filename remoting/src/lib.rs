// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! `remoting`: the interface build and dispatch engine for invoking methods on remote services
//! and actors through ordinary Rust traits.
//!
//! ## Getting started
//!
//! Install `remoting` by adding the following to your Cargo.toml dependencies
//!
//! ```toml
//! [dependencies]
//! remoting = "0.1"
//! ```
//!
//! ## Remotable interfaces
//!
//! A remotable interface is an `async` trait annotated with `#[remote_interface]`. Every argument
//! and result type implements [BytesConvertable], and every method returns a `Result` whose error
//! type can be built from a [RemotingErr] (e.g. [ProcessingErr]).
//!
//! ```rust
//! use std::sync::Arc;
//! use remoting::{remote_interface, BuildCache, LoopbackChannel, ProcessingErr, ServiceHost, TargetId};
//!
//! #[remote_interface]
//! pub trait Greeter: Send + Sync {
//!     async fn greet(&self, name: String) -> Result<String, ProcessingErr>;
//! }
//!
//! struct EnglishGreeter;
//!
//! #[remoting::async_trait]
//! impl Greeter for EnglishGreeter {
//!     async fn greet(&self, name: String) -> Result<String, ProcessingErr> {
//!         Ok(format!("Hello {name}"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = BuildCache::global();
//!     let host = ServiceHost::spawn_for::<dyn Greeter>(
//!         TargetId::new("greeter"),
//!         Arc::new(EnglishGreeter),
//!         cache,
//!     )
//!     .expect("Failed to build the greeter's dispatcher");
//!
//!     let proxy = cache
//!         .get_or_build_proxy_generator::<dyn Greeter>()
//!         .expect("Failed to build the greeter's proxy")
//!         .create_proxy(Arc::new(LoopbackChannel::new(host.clone())));
//!
//!     assert_eq!("Hello world", proxy.greet("world".to_string()).await.unwrap());
//!     host.stop_and_wait().await;
//! }
//! ```
//!
//! ## Building blocks
//!
//! 1. [interface]: signatures, ids and descriptions of remotable interfaces
//! 2. [dispatch]: server-side dispatchers routing a method id to the bound invoker
//! 3. [proxy]: client-side proxies marshalling calls into [envelope::RequestEnvelope]s
//! 4. [build]: the memoizing build cache and the interface details registry
//! 5. [host]: dispatch targets, and the mailbox-driven [ServiceHost]
//! 6. [time]: scheduled callbacks re-entering a dispatch target
//!
//! Transports are provided by the `remoting_transport` crate, through the [Channel] and
//! [RequestHandler] traits.

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// allows the generated bindings to name this crate from within its own tests
extern crate self as remoting;

/// A remotable interface's identifier on the wire
pub type InterfaceId = u32;
/// A method's identifier on the wire, unique within its interface
pub type MethodId = u32;

pub mod build;
pub mod channel;
pub mod concurrency;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod host;
pub mod interface;
pub mod proxy;
pub mod serialization;
pub mod time;


// re-exports
pub use async_trait::async_trait;
pub use remoting_derive::remote_interface;

pub use build::{
    get_or_create_dispatcher, get_or_create_proxy_generator, lookup_interface_details,
    lookup_interface_details_by_name, BuildCache, InterfaceDetails, InterfaceDetailsRegistry,
};
pub use channel::{Channel, LoopbackChannel, RequestHandler};
pub use concurrency::CancellationToken;
pub use dispatch::{
    encode_result, DispatcherSet, InvocationErr, InvokerBinder, MethodDispatcher, ServiceInterface,
};
pub use envelope::{RequestEnvelope, ResponseEnvelope, ResponseFault};
pub use errors::{
    BuildErr, DecodeErr, DispatchErr, ProcessingErr, RemoteFailure, RemotingErr, TargetGone,
    TransportErr,
};
pub use host::{
    CallOrigin, DispatchTarget, MethodCallContext, ServiceHost, TargetDispatch, TargetId,
};
pub use interface::{
    IdScheme, InterfaceDescription, InterfaceKind, InterfaceSignature, InterfaceType,
    MethodDescription, MethodSignature, RemoteInterface, ResultCategory, TypeDescriptor,
};
pub use proxy::{ProxyGenerator, ProxyInterface, ServiceProxy};
pub use serialization::{ArgumentReader, ArgumentWriter, BytesConvertable};
pub use time::{ScheduledCallback, TimerState};
