// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Remoting error types
//!
//! Errors are split along the lifecycle of a remote call
//!
//! 1. [BuildErr]: an interface could not be described or its dispatcher/proxy built. These are
//!    fatal for the interface type and are returned to whoever triggered the first build.
//! 2. [DispatchErr]: the server side could not route or complete a request
//! 3. [TransportErr]: the channel carrying envelopes failed
//! 4. [RemotingErr]: what a proxy caller observes, wrapping all of the above

use std::fmt::Display;

use crate::host::TargetId;
use crate::{InterfaceId, MethodId};

/// Represents a user method's internal processing error
pub type ProcessingErr = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors describing or building an interface's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildErr {
    /// A method on a marker interface doesn't return an awaitable result
    NonAwaitableMethod {
        /// The interface's name
        interface: String,
        /// The offending method
        method: String,
    },
    /// Two methods of the same interface resolved to the same method id
    MethodIdCollision {
        /// The interface's name
        interface: String,
        /// The method which claimed the id first
        first: String,
        /// The method which collided with it
        second: String,
        /// The colliding id
        id: MethodId,
    },
    /// Two distinct interfaces resolved to the same interface id
    InterfaceIdCollision {
        /// The colliding id
        id: InterfaceId,
        /// The interface already holding the id
        existing: String,
        /// The interface which tried to claim it
        incoming: String,
    },
    /// Two distinct interfaces share a wire name but resolve to different ids
    InterfaceNameCollision {
        /// The shared wire name
        name: String,
        /// The interface already registered under the name
        existing: String,
        /// The interface which tried to claim it
        incoming: String,
    },
    /// A described method has no bound invoker (server side)
    MissingInvoker {
        /// The interface's name
        interface: String,
        /// The method without an invoker
        method: String,
    },
    /// The interface declares no methods and derives from no remotable interface
    NoMethods {
        /// The interface's name
        interface: String,
    },
}

impl std::error::Error for BuildErr {}

impl Display for BuildErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonAwaitableMethod { interface, method } => {
                write!(
                    f,
                    "Method '{method}' of marker interface '{interface}' does not return an awaitable result"
                )
            }
            Self::MethodIdCollision {
                interface,
                first,
                second,
                id,
            } => {
                write!(
                    f,
                    "Methods '{first}' and '{second}' of interface '{interface}' both resolve to method id {id}"
                )
            }
            Self::InterfaceIdCollision {
                id,
                existing,
                incoming,
            } => {
                write!(
                    f,
                    "Interface '{incoming}' resolves to id {id} which is already held by '{existing}'"
                )
            }
            Self::InterfaceNameCollision {
                name,
                existing,
                incoming,
            } => {
                write!(
                    f,
                    "Interface '{incoming}' uses the wire name '{name}' which is already registered by '{existing}'"
                )
            }
            Self::MissingInvoker { interface, method } => {
                write!(
                    f,
                    "No invoker is bound for method '{method}' of interface '{interface}'"
                )
            }
            Self::NoMethods { interface } => {
                write!(f, "Interface '{interface}' has no remotable methods")
            }
        }
    }
}

/// Errors decoding an argument or result buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErr {
    /// The buffer ended before the value was complete
    Truncated {
        /// Bytes required to continue
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },
    /// Bytes were left over after every argument was read
    TrailingBytes(usize),
    /// The bytes don't form a valid value of the type
    InvalidValue {
        /// The wire name of the type being decoded
        type_name: String,
        /// What was wrong
        reason: String,
    },
}

impl DecodeErr {
    pub(crate) fn invalid(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

impl std::error::Error for DecodeErr {}

impl Display for DecodeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(
                    f,
                    "Buffer truncated, needed {needed} bytes but only {available} remain"
                )
            }
            Self::TrailingBytes(count) => {
                write!(f, "{count} unexpected trailing bytes after the last argument")
            }
            Self::InvalidValue { type_name, reason } => {
                write!(f, "Invalid '{type_name}' value: {reason}")
            }
        }
    }
}

/// The preserved diagnostic of a failed remote method invocation.
///
/// The original error type is generally not resolvable on the caller's side, so only
/// its rendered description travels back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// Name of the interface the method belongs to
    pub interface: String,
    /// Name of the failed method
    pub method: String,
    /// The error's description, including its source chain
    pub message: String,
}

impl RemoteFailure {
    /// Capture the description of `err`, walking its `source()` chain
    pub fn from_error(
        interface: impl Into<String>,
        method: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            interface: interface.into(),
            method: method.into(),
            message,
        }
    }

    /// Capture a panic payload raised by the invoked method
    pub(crate) fn from_panic(
        interface: impl Into<String>,
        method: impl Into<String>,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(v) => *v,
            Err(e) => match e.downcast::<&str>() {
                Ok(v) => (*v).to_string(),
                _ => "Unknown panic occurred which couldn't be coerced to a string".to_string(),
            },
        };
        Self {
            interface: interface.into(),
            method: method.into(),
            message: format!("panicked: {message}"),
        }
    }
}

impl std::error::Error for RemoteFailure {}

impl Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Remote invocation of '{}.{}' failed: {}",
            self.interface, self.method, self.message
        )
    }
}

/// Raised when the dispatch target has been torn down.
///
/// Callbacks may also return this error themselves to signal that their target
/// no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGone(pub TargetId);

impl std::error::Error for TargetGone {}

impl Display for TargetGone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Target '{}' no longer exists", self.0)
    }
}

/// Server-side dispatch errors
#[derive(Debug)]
pub enum DispatchErr {
    /// No dispatcher is registered for the interface id
    UnknownInterface(InterfaceId),
    /// The interface has no method with this id. Signals version skew between
    /// caller and receiver, or a malformed request
    UnknownMethod {
        /// The interface the request was routed to
        interface_id: InterfaceId,
        /// The unrecognized method id
        method_id: MethodId,
    },
    /// The argument buffer couldn't be decoded
    Decode(DecodeErr),
    /// The invoked method failed
    Failed(RemoteFailure),
    /// The dispatch target no longer exists
    TargetGone(TargetId),
    /// The call was cancelled before it ran
    Cancelled,
}

impl DispatchErr {
    /// Determine if this error signals that the target was torn down
    pub fn is_target_gone(&self) -> bool {
        matches!(self, Self::TargetGone(_))
    }
}

impl std::error::Error for DispatchErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(inner) => Some(inner),
            Self::Failed(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Display for DispatchErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownInterface(id) => {
                write!(f, "No dispatcher is registered for interface id {id}")
            }
            Self::UnknownMethod {
                interface_id,
                method_id,
            } => {
                write!(
                    f,
                    "Interface {interface_id} has no method with id {method_id}"
                )
            }
            Self::Decode(err) => write!(f, "Failed to decode arguments: {err}"),
            Self::Failed(failure) => write!(f, "{failure}"),
            Self::TargetGone(target) => write!(f, "Target '{target}' no longer exists"),
            Self::Cancelled => write!(f, "Dispatch cancelled"),
        }
    }
}

impl From<DecodeErr> for DispatchErr {
    fn from(value: DecodeErr) -> Self {
        Self::Decode(value)
    }
}

impl From<TargetGone> for DispatchErr {
    fn from(value: TargetGone) -> Self {
        Self::TargetGone(value.0)
    }
}

/// Errors raised by a transport channel
#[derive(Debug)]
pub enum TransportErr {
    /// Connecting to the remote endpoint timed out
    ConnectTimeout(std::time::Duration),
    /// Waiting on the response timed out
    OperationTimeout(std::time::Duration),
    /// Closing the connection timed out
    CloseTimeout(std::time::Duration),
    /// The connection is closed
    Closed,
    /// The call was cancelled by the caller
    Cancelled,
    /// An encoded message exceeds the configured maximum
    MessageTooLarge {
        /// The encoded size
        size: usize,
        /// The configured maximum
        max: usize,
    },
    /// The peer sent something which isn't a valid frame
    Protocol(String),
    /// A socket level failure
    Io(std::io::Error),
}

impl std::error::Error for TransportErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Display for TransportErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectTimeout(d) => write!(f, "Connect timed out after {}ms", d.as_millis()),
            Self::OperationTimeout(d) => {
                write!(f, "Operation timed out after {}ms", d.as_millis())
            }
            Self::CloseTimeout(d) => write!(f, "Close timed out after {}ms", d.as_millis()),
            Self::Closed => write!(f, "Channel closed"),
            Self::Cancelled => write!(f, "Call cancelled"),
            Self::MessageTooLarge { size, max } => {
                write!(f, "Message of {size} bytes exceeds the maximum of {max} bytes")
            }
            Self::Protocol(reason) => write!(f, "Protocol error: {reason}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl From<std::io::Error> for TransportErr {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Error types observed by a proxy caller
#[derive(Debug)]
pub enum RemotingErr {
    /// The interface's artifacts couldn't be built
    Build(BuildErr),
    /// The remote method ran and failed
    Remote(RemoteFailure),
    /// The receiver rejected the request without running the method
    Fault(crate::envelope::ResponseFault),
    /// The transport failed
    Transport(TransportErr),
    /// The result couldn't be decoded into the declared result type
    Decode(DecodeErr),
    /// The proxy has no route for the method. The proxy wasn't built for this interface
    UnroutedMethod {
        /// The rust type of the interface
        interface: &'static str,
        /// The method's declaration ordinal
        ordinal: usize,
    },
}

impl RemotingErr {
    /// Determine if the error was reported because the remote target no longer exists
    pub fn is_target_gone(&self) -> bool {
        matches!(
            self,
            Self::Fault(crate::envelope::ResponseFault::TargetGone(_))
        )
    }

    /// Retrieve the remote failure, if the remote method itself failed
    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote(failure) => Some(failure),
            _ => None,
        }
    }
}

impl std::error::Error for RemotingErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Build(inner) => Some(inner),
            Self::Remote(inner) => Some(inner),
            Self::Transport(inner) => Some(inner),
            Self::Decode(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Display for RemotingErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build(err) => write!(f, "{err}"),
            Self::Remote(failure) => write!(f, "{failure}"),
            Self::Fault(fault) => write!(f, "{fault}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::Decode(err) => write!(f, "Failed to decode result: {err}"),
            Self::UnroutedMethod { interface, ordinal } => {
                write!(
                    f,
                    "Proxy has no route for method #{ordinal} of '{interface}'"
                )
            }
        }
    }
}

impl From<BuildErr> for RemotingErr {
    fn from(value: BuildErr) -> Self {
        Self::Build(value)
    }
}

impl From<TransportErr> for RemotingErr {
    fn from(value: TransportErr) -> Self {
        Self::Transport(value)
    }
}

impl From<DecodeErr> for RemotingErr {
    fn from(value: DecodeErr) -> Self {
        Self::Decode(value)
    }
}

impl From<crate::envelope::ResponseFault> for RemotingErr {
    fn from(value: crate::envelope::ResponseFault) -> Self {
        match value {
            crate::envelope::ResponseFault::Failed(failure) => Self::Remote(failure),
            other => Self::Fault(other),
        }
    }
}
