// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Request and response envelopes exchanged between a proxy and a dispatcher

use std::fmt::Display;

use crate::{DispatchErr, InterfaceId, MethodId, RemoteFailure};

/// A single remote method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// The id of the interface declaring the method
    pub interface_id: InterfaceId,
    /// The method's id within the interface
    pub method_id: MethodId,
    /// The packed arguments
    pub arguments: Vec<u8>,
    /// The id of the call chain this request belongs to. A request carrying the id of
    /// the chain currently executing on the target is reentrant
    pub correlation_id: Option<String>,
}

impl RequestEnvelope {
    /// Create a new request outside of any call chain
    pub fn new(interface_id: InterfaceId, method_id: MethodId, arguments: Vec<u8>) -> Self {
        Self {
            interface_id,
            method_id,
            arguments,
            correlation_id: None,
        }
    }

    /// Attach the request to a call chain
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Why a request produced no result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFault {
    /// The remote method ran and failed
    Failed(RemoteFailure),
    /// The receiver doesn't serve the interface
    UnknownInterface(InterfaceId),
    /// The interface has no such method
    UnknownMethod {
        /// The interface id of the request
        interface_id: InterfaceId,
        /// The unrecognized method id
        method_id: MethodId,
    },
    /// The receiver couldn't decode the arguments
    Decode(String),
    /// The target no longer exists
    TargetGone(String),
    /// The call was cancelled before it ran
    Cancelled,
}

impl Display for ResponseFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "{failure}"),
            Self::UnknownInterface(id) => write!(f, "Receiver doesn't serve interface {id}"),
            Self::UnknownMethod {
                interface_id,
                method_id,
            } => write!(
                f,
                "Interface {interface_id} has no method with id {method_id}"
            ),
            Self::Decode(reason) => write!(f, "Receiver failed to decode arguments: {reason}"),
            Self::TargetGone(target) => write!(f, "Target '{target}' no longer exists"),
            Self::Cancelled => write!(f, "Call cancelled"),
        }
    }
}

impl From<DispatchErr> for ResponseFault {
    fn from(value: DispatchErr) -> Self {
        match value {
            DispatchErr::UnknownInterface(id) => Self::UnknownInterface(id),
            DispatchErr::UnknownMethod {
                interface_id,
                method_id,
            } => Self::UnknownMethod {
                interface_id,
                method_id,
            },
            DispatchErr::Decode(err) => Self::Decode(err.to_string()),
            DispatchErr::Failed(failure) => Self::Failed(failure),
            DispatchErr::TargetGone(target) => Self::TargetGone(target.to_string()),
            DispatchErr::Cancelled => Self::Cancelled,
        }
    }
}

/// The outcome of a single remote method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// The encoded result, or why there is none
    pub result: Result<Vec<u8>, ResponseFault>,
}

impl ResponseEnvelope {
    /// A successful response
    pub fn ok(result: Vec<u8>) -> Self {
        Self { result: Ok(result) }
    }

    /// A failed response
    pub fn fault(fault: ResponseFault) -> Self {
        Self { result: Err(fault) }
    }
}

impl From<Result<Vec<u8>, DispatchErr>> for ResponseEnvelope {
    fn from(value: Result<Vec<u8>, DispatchErr>) -> Self {
        Self {
            result: value.map_err(ResponseFault::from),
        }
    }
}
