// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Client-side proxies
//!
//! Every remotable interface implements its trait for [ServiceProxy]. The implementation packs
//! the arguments and calls [ServiceProxy::invoke] with the method's declaration position, and the
//! proxy translates the position into the interface/method id pair resolved when its
//! [ProxyGenerator] was built. Since a single proxy object implements every interface it was
//! built with, a proxy for a derived interface also serves the calls declared on each ancestor.
//!
//! A proxy holds no mutable state beyond its channel, so it can be shared freely between
//! concurrent callers.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::channel::Channel;
use crate::concurrency::CancellationToken;
use crate::envelope::RequestEnvelope;
use crate::serialization::ArgumentWriter;
use crate::{
    BuildErr, BytesConvertable, InterfaceDescription, InterfaceId, MethodId, RemoteInterface,
    RemotingErr,
};


/// Implemented on the trait-object type of a remotable interface to wrap a [ServiceProxy]
/// as that interface
pub trait ProxyInterface: RemoteInterface {
    /// View the proxy as the interface
    fn from_proxy(proxy: ServiceProxy) -> Arc<Self>;
}

/// Maps a method's declaring interface and position onto its wire ids
#[derive(Debug, Default)]
pub struct ProxyRoutes {
    routes: HashMap<(TypeId, usize), (InterfaceId, MethodId)>,
}

impl ProxyRoutes {
    fn build(descriptions: &[Arc<InterfaceDescription>]) -> Result<Self, BuildErr> {
        let mut claimed: HashMap<InterfaceId, &'static str> = HashMap::new();
        let mut routes = HashMap::new();
        for description in descriptions.iter() {
            if let Some(existing) = claimed.insert(description.id, description.name) {
                return Err(BuildErr::InterfaceIdCollision {
                    id: description.id,
                    existing: existing.to_string(),
                    incoming: description.name.to_string(),
                });
            }
            let interface = description.interface_type.type_id();
            for method in description.methods.iter() {
                routes.insert((interface, method.ordinal), (description.id, method.id));
            }
        }
        Ok(Self { routes })
    }

    /// The wire ids of the method at `ordinal` declared by `interface`
    pub fn route(&self, interface: TypeId, ordinal: usize) -> Option<(InterfaceId, MethodId)> {
        self.routes.get(&(interface, ordinal)).copied()
    }
}

/// The object behind every proxy, bound to exactly one remote target through its channel
#[derive(Clone)]
pub struct ServiceProxy {
    routes: Arc<ProxyRoutes>,
    channel: Arc<dyn Channel>,
    correlation_id: Option<String>,
}

impl ServiceProxy {
    /// Invoke a remote method and decode its result
    ///
    /// * `ordinal` - The method's declaration position within `I`
    /// * `arguments` - The packed arguments
    /// * `cancel` - The caller's cancellation signal, if the method takes one
    pub async fn invoke<I, R>(
        &self,
        ordinal: usize,
        arguments: ArgumentWriter,
        cancel: Option<CancellationToken>,
    ) -> Result<R, RemotingErr>
    where
        I: RemoteInterface + ?Sized,
        R: BytesConvertable,
    {
        let (interface_id, method_id) = self.routes.route(TypeId::of::<I>(), ordinal).ok_or(
            RemotingErr::UnroutedMethod {
                interface: std::any::type_name::<I>(),
                ordinal,
            },
        )?;
        let mut request = RequestEnvelope::new(interface_id, method_id, arguments.into_bytes());
        request.correlation_id = self.correlation_id.clone();

        let response = self
            .channel
            .send(request, cancel.unwrap_or_default())
            .await?;
        let result = response.result?;
        Ok(R::from_bytes(result)?)
    }

    /// The call chain this proxy's calls belong to
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("routes", &self.routes.routes.len())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Produces proxies implementing the interface `I`
pub struct ProxyGenerator<I: ?Sized> {
    descriptions: Vec<Arc<InterfaceDescription>>,
    routes: Arc<ProxyRoutes>,
    _interface: PhantomData<fn() -> Arc<I>>,
}

impl<I: ProxyInterface + ?Sized> ProxyGenerator<I> {
    /// Build a generator whose proxies implement `I` and every described interface
    ///
    /// * `descriptions` - The descriptions of `I` and its ancestors
    pub fn build(descriptions: &[Arc<InterfaceDescription>]) -> Result<Self, BuildErr> {
        Ok(Self {
            descriptions: descriptions.to_vec(),
            routes: Arc::new(ProxyRoutes::build(descriptions)?),
            _interface: PhantomData,
        })
    }

    /// The descriptions the generator was built from
    pub fn descriptions(&self) -> &[Arc<InterfaceDescription>] {
        &self.descriptions
    }

    /// Create a proxy bound to the target on the other side of `channel`
    pub fn create_proxy(&self, channel: Arc<dyn Channel>) -> Arc<I> {
        self.proxy(channel, None)
    }

    /// Create a proxy whose calls join an existing call chain, making them reentrant on
    /// the target currently executing that chain
    pub fn create_proxy_in_chain(
        &self,
        channel: Arc<dyn Channel>,
        correlation_id: impl Into<String>,
    ) -> Arc<I> {
        self.proxy(channel, Some(correlation_id.into()))
    }

    fn proxy(&self, channel: Arc<dyn Channel>, correlation_id: Option<String>) -> Arc<I> {
        I::from_proxy(ServiceProxy {
            routes: self.routes.clone(),
            channel,
            correlation_id,
        })
    }
}
