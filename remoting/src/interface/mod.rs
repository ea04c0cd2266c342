// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Remotable interfaces and their descriptions
//!
//! A remotable interface is a trait whose trait-object type (`dyn MyService`) implements
//! [RemoteInterface]. The implementation supplies the interface's [InterfaceSignature]: its
//! wire name, whether it's a marker (primary) interface or a plain contract, its ordered methods
//! and the remotable interfaces it derives from.
//!
//! Signatures are normally produced by the `#[remote_interface]` attribute, but can be written
//! by hand with the builder methods on [InterfaceSignature] and [MethodSignature].
//!
//! An [InterfaceDescription] is the analyzed, validated form of a signature carrying the
//! interface id and the method ids under a chosen [IdScheme].
//!
//! ## Example
//!
//! ```rust
//! use remoting::{InterfaceDescription, InterfaceSignature, InterfaceType, IdScheme, MethodSignature, RemoteInterface};
//!
//! trait Counter: Send + Sync {}
//!
//! impl RemoteInterface for dyn Counter {
//!     fn signature() -> InterfaceSignature {
//!         InterfaceSignature::marker("Counter")
//!             .method(MethodSignature::new("add").param::<u64>().returns::<u64>())
//!             .method(MethodSignature::new("reset"))
//!     }
//! }
//!
//! let description = InterfaceDescription::describe(InterfaceType::of::<dyn Counter>(), IdScheme::ContentHash)
//!     .expect("Counter is a valid interface");
//! assert_eq!(2, description.methods.len());
//! ```

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt::Display;

use crate::BytesConvertable;

mod description;
mod id;

pub use description::{InterfaceDescription, MethodDescription, ResultCategory};
pub use id::IdScheme;


/// Implemented on the trait-object type of every remotable interface
pub trait RemoteInterface: 'static {
    /// The interface's declared shape
    fn signature() -> InterfaceSignature;
}

/// The stable wire name of an argument or result type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeDescriptor(Cow<'static, str>);

impl TypeDescriptor {
    /// Describe the given serializable type
    pub fn of<T: BytesConvertable>() -> Self {
        Self(T::type_name())
    }

    /// The wire name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Whether this descriptor is the unit type, i.e. "no value"
    pub fn is_unit(&self) -> bool {
        self.0 == "()"
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker interfaces are primary remotable interfaces, subject to the strict requirement
/// that every method is awaitable. Contracts are plain base interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// A primary remotable interface
    Marker,
    /// A base contract
    Contract,
}

/// The declared shape of a single interface method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// The method's name
    pub name: &'static str,
    /// Ordered parameter types, excluding a trailing cancellation signal
    pub params: Vec<TypeDescriptor>,
    /// The declared result type, unit when the method has no result
    pub returns: TypeDescriptor,
    /// The final parameter is a cancellation signal
    pub cancellable: bool,
    /// The method returns an awaitable result
    pub awaitable: bool,
}

impl MethodSignature {
    /// An awaitable, parameterless method with no result
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: vec![],
            returns: TypeDescriptor::of::<()>(),
            cancellable: false,
            awaitable: true,
        }
    }

    /// Append a parameter
    pub fn param<T: BytesConvertable>(mut self) -> Self {
        self.params.push(TypeDescriptor::of::<T>());
        self
    }

    /// Set the result type
    pub fn returns<T: BytesConvertable>(mut self) -> Self {
        self.returns = TypeDescriptor::of::<T>();
        self
    }

    /// Mark the method as taking a trailing cancellation signal
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Mark the method's result as not awaitable
    pub fn blocking(mut self) -> Self {
        self.awaitable = false;
        self
    }

    /// The canonical rendering `name(param1,param2)`
    pub fn canonical(&self) -> String {
        let params = self
            .params
            .iter()
            .map(TypeDescriptor::name)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({params})", self.name)
    }
}

/// The declared shape of a remotable interface
#[derive(Debug, Clone)]
pub struct InterfaceSignature {
    /// The interface's wire name
    pub name: &'static str,
    /// Marker or contract
    pub kind: InterfaceKind,
    /// The interface's own methods, in declaration order
    pub methods: Vec<MethodSignature>,
    /// The remotable interfaces this one directly derives from
    pub bases: Vec<InterfaceType>,
}

impl InterfaceSignature {
    /// Start a marker interface's signature
    pub fn marker(name: &'static str) -> Self {
        Self::with_kind(name, InterfaceKind::Marker)
    }

    /// Start a contract interface's signature
    pub fn contract(name: &'static str) -> Self {
        Self::with_kind(name, InterfaceKind::Contract)
    }

    fn with_kind(name: &'static str, kind: InterfaceKind) -> Self {
        Self {
            name,
            kind,
            methods: vec![],
            bases: vec![],
        }
    }

    /// Append a method
    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }

    /// Append a base interface
    pub fn base<B: RemoteInterface + ?Sized>(mut self) -> Self {
        self.bases.push(InterfaceType::of::<B>());
        self
    }
}

/// The identity of a remotable interface type
#[derive(Clone, Copy)]
pub struct InterfaceType {
    type_id: TypeId,
    rust_name: &'static str,
    signature: fn() -> InterfaceSignature,
}

impl InterfaceType {
    /// Capture the identity of `I`
    pub fn of<I: RemoteInterface + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<I>(),
            rust_name: std::any::type_name::<I>(),
            signature: I::signature,
        }
    }

    /// The [TypeId] of the interface's trait-object type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The compiler's name of the trait-object type. Only for diagnostics, never on the wire
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Produce the interface's signature
    pub fn signature(&self) -> InterfaceSignature {
        (self.signature)()
    }
}

impl PartialEq for InterfaceType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for InterfaceType {}

impl std::hash::Hash for InterfaceType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InterfaceType({})", self.rust_name)
    }
}
