// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Analysis of interface signatures into descriptions

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::{IdScheme, InterfaceKind, InterfaceSignature, InterfaceType, TypeDescriptor};
use crate::{BuildErr, InterfaceId, MethodId};

/// Whether a method produces a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCategory {
    /// The method completes without a value
    NoResult,
    /// The method completes with a single value of the given type
    SingleResult(TypeDescriptor),
}

/// The analyzed form of a single interface method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescription {
    /// The method's id within its interface
    pub id: MethodId,
    /// The method's declaration position within its interface
    pub ordinal: usize,
    /// The method's name
    pub name: &'static str,
    /// Ordered parameter types
    pub parameters: Vec<TypeDescriptor>,
    /// The result category
    pub result: ResultCategory,
    /// The final parameter is a cancellation signal
    pub cancellable: bool,
}

/// The analyzed form of a remotable interface
#[derive(Debug, Clone)]
pub struct InterfaceDescription {
    /// The interface's id
    pub id: InterfaceId,
    /// The interface's wire name
    pub name: &'static str,
    /// The originating interface type
    pub interface_type: InterfaceType,
    /// Marker or contract
    pub kind: InterfaceKind,
    /// The scheme the ids were assigned with
    pub scheme: IdScheme,
    /// The interface's own methods, in declaration order
    pub methods: Vec<MethodDescription>,
}

impl InterfaceDescription {
    /// Analyze a single interface, excluding its bases
    ///
    /// * `interface_type` - The interface to describe
    /// * `scheme` - How to assign interface and method ids
    ///
    /// Returns [Err(BuildErr)] when a marker interface has a non-awaitable method, when two
    /// methods resolve to the same id or when the interface has neither methods nor bases.
    pub fn describe(interface_type: InterfaceType, scheme: IdScheme) -> Result<Self, BuildErr> {
        let signature = interface_type.signature();
        Self::from_signature(interface_type, &signature, scheme)
    }

    /// Analyze an interface and every unique ancestor interface.
    ///
    /// The interface itself comes first, followed by its ancestors in depth-first
    /// declaration order. An ancestor reachable along several paths is described once.
    pub fn describe_hierarchy(
        interface_type: InterfaceType,
        scheme: IdScheme,
    ) -> Result<Vec<Arc<Self>>, BuildErr> {
        Self::walk_hierarchy(interface_type, |next| {
            Self::describe(next, scheme).map(Arc::new)
        })
    }

    /// Visit the hierarchy of `interface_type`, obtaining each unique interface's
    /// description from `describe`
    pub(crate) fn walk_hierarchy<F>(
        interface_type: InterfaceType,
        mut describe: F,
    ) -> Result<Vec<Arc<Self>>, BuildErr>
    where
        F: FnMut(InterfaceType) -> Result<Arc<Self>, BuildErr>,
    {
        let mut visited = HashSet::new();
        let mut descriptions = vec![];
        let mut pending = vec![interface_type];

        while let Some(next) = pending.pop() {
            if !visited.insert(next) {
                continue;
            }
            // push in reverse so the first declared base is visited first
            pending.extend(next.signature().bases.iter().rev().copied());
            descriptions.push(describe(next)?);
        }

        let mut ids: HashMap<InterfaceId, &'static str> = HashMap::new();
        for description in descriptions.iter() {
            if let Some(existing) = ids.insert(description.id, description.name) {
                return Err(BuildErr::InterfaceIdCollision {
                    id: description.id,
                    existing: existing.to_string(),
                    incoming: description.name.to_string(),
                });
            }
        }
        Ok(descriptions)
    }

    fn from_signature(
        interface_type: InterfaceType,
        signature: &InterfaceSignature,
        scheme: IdScheme,
    ) -> Result<Self, BuildErr> {
        if signature.methods.is_empty() && signature.bases.is_empty() {
            return Err(BuildErr::NoMethods {
                interface: signature.name.to_string(),
            });
        }

        let mut methods = Vec::with_capacity(signature.methods.len());
        let mut claimed: HashMap<MethodId, &'static str> = HashMap::new();
        for (ordinal, method) in signature.methods.iter().enumerate() {
            if signature.kind == InterfaceKind::Marker && !method.awaitable {
                return Err(BuildErr::NonAwaitableMethod {
                    interface: signature.name.to_string(),
                    method: method.name.to_string(),
                });
            }

            let id = scheme.method_id(ordinal, method);
            if let Some(first) = claimed.insert(id, method.name) {
                return Err(BuildErr::MethodIdCollision {
                    interface: signature.name.to_string(),
                    first: first.to_string(),
                    second: method.name.to_string(),
                    id,
                });
            }

            let result = if method.returns.is_unit() {
                ResultCategory::NoResult
            } else {
                ResultCategory::SingleResult(method.returns.clone())
            };
            methods.push(MethodDescription {
                id,
                ordinal,
                name: method.name,
                parameters: method.params.clone(),
                result,
                cancellable: method.cancellable,
            });
        }

        Ok(Self {
            id: scheme.interface_id(signature),
            name: signature.name,
            interface_type,
            kind: signature.kind,
            scheme,
            methods,
        })
    }

    /// Find a method by its id
    pub fn method(&self, id: MethodId) -> Option<&MethodDescription> {
        self.methods.iter().find(|method| method.id == id)
    }

    /// Find a method by its declaration position
    pub fn method_at(&self, ordinal: usize) -> Option<&MethodDescription> {
        self.methods.get(ordinal)
    }

    /// Every argument and result type a receiver needs to decode this interface's traffic
    pub fn known_types(&self) -> BTreeSet<TypeDescriptor> {
        let mut types = BTreeSet::new();
        for method in self.methods.iter() {
            types.extend(method.parameters.iter().cloned());
            if let ResultCategory::SingleResult(ty) = &method.result {
                types.insert(ty.clone());
            }
        }
        types
    }
}
