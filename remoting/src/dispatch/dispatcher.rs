// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Method dispatchers built from interface descriptions

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::{InvocationErr, Invoker, InvokerBinder};
use crate::concurrency::CancellationToken;
use crate::errors::TargetGone;
use crate::serialization::ArgumentReader;
use crate::{
    BuildErr, DispatchErr, InterfaceDescription, InterfaceId, MethodDescription, MethodId,
    RemoteFailure,
};

/// Invokes the methods of a single interface on a target of type `T`, routing by method id
pub struct MethodDispatcher<T: ?Sized> {
    description: Arc<InterfaceDescription>,
    invokers: HashMap<MethodId, (usize, Invoker<T>)>,
}

impl<T: ?Sized + Send + Sync + 'static> MethodDispatcher<T> {
    /// Build the dispatcher for `description` from the bound invokers
    ///
    /// Returns [Err(BuildErr::MissingInvoker)] when a described method has no invoker in `binder`
    pub fn build(
        description: Arc<InterfaceDescription>,
        binder: &InvokerBinder<T>,
    ) -> Result<Self, BuildErr> {
        let interface = description.interface_type.type_id();
        let mut invokers = HashMap::with_capacity(description.methods.len());
        for method in description.methods.iter() {
            let invoker =
                binder
                    .get(interface, method.ordinal)
                    .ok_or_else(|| BuildErr::MissingInvoker {
                        interface: description.name.to_string(),
                        method: method.name.to_string(),
                    })?;
            invokers.insert(method.id, (method.ordinal, invoker));
        }
        Ok(Self {
            description,
            invokers,
        })
    }

    /// The description this dispatcher was built from
    pub fn description(&self) -> &InterfaceDescription {
        &self.description
    }

    /// Resolve a method id and bind it with its arguments, without invoking anything
    pub fn prepare(
        &self,
        method_id: MethodId,
        arguments: Vec<u8>,
    ) -> Result<PreparedCall<T>, DispatchErr> {
        let (ordinal, invoker) =
            self.invokers
                .get(&method_id)
                .ok_or(DispatchErr::UnknownMethod {
                    interface_id: self.description.id,
                    method_id,
                })?;
        let method = self
            .description
            .method_at(*ordinal)
            .ok_or(DispatchErr::UnknownMethod {
                interface_id: self.description.id,
                method_id,
            })?;
        Ok(PreparedCall {
            interface: self.description.name,
            method: method.clone(),
            invoker: invoker.clone(),
            arguments,
        })
    }

    /// Invoke the method `method_id` on `target`
    ///
    /// An unrecognized method id fails with [DispatchErr::UnknownMethod] and nothing is invoked.
    pub async fn dispatch(
        &self,
        target: Arc<T>,
        method_id: MethodId,
        arguments: Vec<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, DispatchErr> {
        self.prepare(method_id, arguments)?
            .invoke(target, cancel)
            .await
    }
}

/// A resolved method bound to its arguments, ready to run on a target
pub struct PreparedCall<T: ?Sized> {
    interface: &'static str,
    method: MethodDescription,
    invoker: Invoker<T>,
    arguments: Vec<u8>,
}

impl<T: ?Sized + Send + Sync + 'static> PreparedCall<T> {
    /// The wire name of the interface declaring the method
    pub fn interface_name(&self) -> &'static str {
        self.interface
    }

    /// The resolved method
    pub fn method(&self) -> &MethodDescription {
        &self.method
    }

    /// Run the method on `target`. Errors and panics raised by the user method are captured
    /// as [RemoteFailure]s
    pub async fn invoke(
        self,
        target: Arc<T>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, DispatchErr> {
        if cancel.is_cancelled() {
            return Err(DispatchErr::Cancelled);
        }
        let Self {
            interface,
            method,
            invoker,
            arguments,
        } = self;
        let fut = async move { invoker(target, ArgumentReader::new(arguments), cancel).await };
        run_guarded(interface, method.name, fut).await
    }
}

/// Run a user future, capturing its errors and panics
pub(crate) async fn run_guarded<F>(
    interface: &str,
    method: &str,
    fut: F,
) -> Result<Vec<u8>, DispatchErr>
where
    F: Future<Output = Result<Vec<u8>, InvocationErr>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(InvocationErr::Decode(err))) => Err(DispatchErr::Decode(err)),
        Ok(Err(InvocationErr::Failed(err))) => {
            if let Some(gone) = err.downcast_ref::<TargetGone>() {
                return Err(DispatchErr::TargetGone(gone.0.clone()));
            }
            Err(DispatchErr::Failed(RemoteFailure::from_error(
                interface,
                method,
                err.as_ref(),
            )))
        }
        Err(panic) => {
            log::error!("'{interface}.{method}' panicked");
            Err(DispatchErr::Failed(RemoteFailure::from_panic(
                interface, method, panic,
            )))
        }
    }
}

/// The dispatchers of an interface and all of its ancestors, routed by interface id
pub struct DispatcherSet<T: ?Sized> {
    primary: InterfaceId,
    dispatchers: HashMap<InterfaceId, MethodDispatcher<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> DispatcherSet<T> {
    /// Build a dispatcher for each description. The first description is the primary interface
    pub fn build(
        descriptions: &[Arc<InterfaceDescription>],
        binder: &InvokerBinder<T>,
    ) -> Result<Self, BuildErr> {
        let primary = descriptions
            .first()
            .map(|description| description.id)
            .unwrap_or_default();
        let mut dispatchers: HashMap<InterfaceId, MethodDispatcher<T>> = HashMap::new();
        for description in descriptions.iter() {
            if let Some(existing) = dispatchers.get(&description.id) {
                return Err(BuildErr::InterfaceIdCollision {
                    id: description.id,
                    existing: existing.description().name.to_string(),
                    incoming: description.name.to_string(),
                });
            }
            let dispatcher = MethodDispatcher::build(description.clone(), binder)?;
            dispatchers.insert(description.id, dispatcher);
        }
        Ok(Self {
            primary,
            dispatchers,
        })
    }

    /// The id of the primary interface
    pub fn primary_id(&self) -> InterfaceId {
        self.primary
    }

    /// The dispatcher for the interface `interface_id`, if the set covers it
    pub fn get(&self, interface_id: InterfaceId) -> Option<&MethodDispatcher<T>> {
        self.dispatchers.get(&interface_id)
    }

    /// The ids of every interface the set routes
    pub fn interface_ids(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.dispatchers.keys().copied()
    }

    /// Resolve a request's interface and method ids
    pub fn prepare(
        &self,
        interface_id: InterfaceId,
        method_id: MethodId,
        arguments: Vec<u8>,
    ) -> Result<PreparedCall<T>, DispatchErr> {
        self.get(interface_id)
            .ok_or(DispatchErr::UnknownInterface(interface_id))?
            .prepare(method_id, arguments)
    }

    /// Route a request to the right dispatcher and invoke it on `target`
    pub async fn dispatch(
        &self,
        target: Arc<T>,
        interface_id: InterfaceId,
        method_id: MethodId,
        arguments: Vec<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, DispatchErr> {
        self.prepare(interface_id, method_id, arguments)?
            .invoke(target, cancel)
            .await
    }
}
