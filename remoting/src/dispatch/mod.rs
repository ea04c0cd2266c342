// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Server-side method dispatch
//!
//! A server binds an invoking closure for every method of a remotable interface through
//! [ServiceInterface::bind]. The bindings are generic over the target type `T`, so a derived
//! interface binds its ancestors' methods by calling their `bind` for the same target.
//!
//! [MethodDispatcher] resolves every described method id to its bound invoker once, at
//! construction. [DispatcherSet] groups the dispatchers of an interface and all of its ancestors
//! and routes a request by interface id and then method id.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::concurrency::CancellationToken;
use crate::serialization::ArgumentReader;
use crate::{BytesConvertable, DecodeErr, ProcessingErr, RemoteInterface};

mod dispatcher;

pub(crate) use dispatcher::run_guarded;
pub use dispatcher::{DispatcherSet, MethodDispatcher, PreparedCall};

#[cfg(test)]
mod tests;

/// The failure of a bound invoker
#[derive(Debug)]
pub enum InvocationErr {
    /// The arguments couldn't be decoded
    Decode(DecodeErr),
    /// The user method returned an error
    Failed(ProcessingErr),
}

impl From<DecodeErr> for InvocationErr {
    fn from(value: DecodeErr) -> Self {
        Self::Decode(value)
    }
}

impl std::fmt::Display for InvocationErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{err}"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InvocationErr {}

/// Encode a user method's result into the response buffer
pub fn encode_result<R, E>(result: Result<R, E>) -> Result<Vec<u8>, InvocationErr>
where
    R: BytesConvertable,
    E: Into<ProcessingErr>,
{
    result
        .map(BytesConvertable::into_bytes)
        .map_err(|err| InvocationErr::Failed(err.into()))
}

/// The future of a running invocation
pub type InvokeFuture = BoxFuture<'static, Result<Vec<u8>, InvocationErr>>;

pub(crate) type Invoker<T> =
    Arc<dyn Fn(Arc<T>, ArgumentReader, CancellationToken) -> InvokeFuture + Send + Sync>;

/// Implemented on the trait-object type of a remotable interface to bind its methods
/// for any target `T` implementing the interface
pub trait ServiceInterface<T: ?Sized>: RemoteInterface {
    /// Bind an invoker for each of the interface's own methods and for every base
    /// interface's methods
    fn bind(binder: &mut InvokerBinder<T>);
}

/// Collects the invokers of an interface hierarchy, keyed by the declaring interface
/// and the method's declaration position
pub struct InvokerBinder<T: ?Sized> {
    invokers: HashMap<(TypeId, usize), Invoker<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Default for InvokerBinder<T> {
    fn default() -> Self {
        Self {
            invokers: HashMap::new(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> InvokerBinder<T> {
    /// Create an empty binder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a binder holding every invoker of the interface `I` and its bases
    pub fn of<I: ServiceInterface<T> + ?Sized>() -> Self {
        let mut binder = Self::new();
        binder.bind::<I>();
        binder
    }

    /// Bind every method of the interface `I` and its bases
    pub fn bind<I: ServiceInterface<T> + ?Sized>(&mut self) -> &mut Self {
        I::bind(self);
        self
    }

    /// Bind the invoker for the method at `ordinal` of the interface `I`
    ///
    /// * `ordinal` - The method's declaration position within `I`
    /// * `invoker` - Decodes the arguments, calls the method on the target and encodes the result
    pub fn method<I, F, Fut>(&mut self, ordinal: usize, invoker: F) -> &mut Self
    where
        I: RemoteInterface + ?Sized,
        F: Fn(Arc<T>, ArgumentReader, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, InvocationErr>> + Send + 'static,
    {
        let invoker: Invoker<T> = Arc::new(move |target, args, cancel| {
            let fut: InvokeFuture = Box::pin(invoker(target, args, cancel));
            fut
        });
        self.invokers.insert((TypeId::of::<I>(), ordinal), invoker);
        self
    }

    pub(crate) fn get(&self, interface: TypeId, ordinal: usize) -> Option<Invoker<T>> {
        self.invokers.get(&(interface, ordinal)).cloned()
    }

    /// The number of bound invokers
    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }
}
