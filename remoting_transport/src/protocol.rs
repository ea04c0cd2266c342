// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Protobuf messages exchanged over-the-wire between a channel and a listener. Derived via [prost]

use remoting::{
    RemoteFailure, RequestEnvelope, ResponseEnvelope, ResponseFault, TransportErr,
};

/// The top-level message of every frame
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireFrame {
    /// The frame's content
    #[prost(oneof = "wire_frame::Frame", tags = "1, 2, 3, 4")]
    pub frame: Option<wire_frame::Frame>,
}

/// Nested types of [WireFrame]
pub mod wire_frame {
    /// The frame's content
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Frame {
        /// A method call
        #[prost(message, tag = "1")]
        Request(super::WireRequest),
        /// The outcome of a method call
        #[prost(message, tag = "2")]
        Response(super::WireResponse),
        /// The caller abandoned a call
        #[prost(message, tag = "3")]
        Cancel(super::WireCancel),
        /// Keeps an idle connection alive, echoed by the listener
        #[prost(message, tag = "4")]
        Heartbeat(super::WireHeartbeat),
    }
}

/// A method call
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireRequest {
    /// Correlates the response with the call, unique per connection
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    /// The id of the interface declaring the method
    #[prost(uint32, tag = "2")]
    pub interface_id: u32,
    /// The method's id
    #[prost(uint32, tag = "3")]
    pub method_id: u32,
    /// The packed arguments
    #[prost(bytes = "vec", tag = "4")]
    pub arguments: Vec<u8>,
    /// The call chain of the request
    #[prost(string, optional, tag = "5")]
    pub correlation_id: Option<String>,
}

/// The outcome of a method call
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireResponse {
    /// The id of the answered request
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    /// The result, or why there is none
    #[prost(oneof = "wire_response::Outcome", tags = "2, 3")]
    pub outcome: Option<wire_response::Outcome>,
}

/// Nested types of [WireResponse]
pub mod wire_response {
    /// The result, or why there is none
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Outcome {
        /// The encoded result
        #[prost(bytes, tag = "2")]
        Payload(Vec<u8>),
        /// Why the call produced no result
        #[prost(message, tag = "3")]
        Fault(super::WireFault),
    }
}

/// Why a call produced no result
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireFault {
    /// The fault's kind
    #[prost(enumeration = "FaultKind", tag = "1")]
    pub kind: i32,
    /// The diagnostic text
    #[prost(string, tag = "2")]
    pub message: String,
    /// The failed interface's name, for [FaultKind::Failed]
    #[prost(string, tag = "3")]
    pub interface: String,
    /// The failed method's name, for [FaultKind::Failed]
    #[prost(string, tag = "4")]
    pub method: String,
    /// The unknown interface id, or the interface of the unknown method
    #[prost(uint32, tag = "5")]
    pub interface_id: u32,
    /// The unknown method id
    #[prost(uint32, tag = "6")]
    pub method_id: u32,
}

/// The kinds of [WireFault]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FaultKind {
    /// Never sent
    Unspecified = 0,
    /// The remote method ran and failed
    Failed = 1,
    /// The receiver doesn't serve the interface
    UnknownInterface = 2,
    /// The interface has no such method
    UnknownMethod = 3,
    /// The receiver couldn't decode the arguments
    Decode = 4,
    /// The target no longer exists
    TargetGone = 5,
    /// The call was cancelled before it ran
    Cancelled = 6,
}

/// The caller abandoned a call
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireCancel {
    /// The id of the abandoned request
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
}

/// Keeps an idle connection alive
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireHeartbeat {}

impl WireFrame {
    /// A frame carrying a request
    pub fn request(request_id: u64, request: RequestEnvelope) -> Self {
        Self {
            frame: Some(wire_frame::Frame::Request(WireRequest {
                request_id,
                interface_id: request.interface_id,
                method_id: request.method_id,
                arguments: request.arguments,
                correlation_id: request.correlation_id,
            })),
        }
    }

    /// A frame carrying a response
    pub fn response(request_id: u64, response: ResponseEnvelope) -> Self {
        let outcome = match response.result {
            Ok(payload) => wire_response::Outcome::Payload(payload),
            Err(fault) => wire_response::Outcome::Fault(WireFault::from(fault)),
        };
        Self {
            frame: Some(wire_frame::Frame::Response(WireResponse {
                request_id,
                outcome: Some(outcome),
            })),
        }
    }

    /// A frame abandoning a request
    pub fn cancel(request_id: u64) -> Self {
        Self {
            frame: Some(wire_frame::Frame::Cancel(WireCancel { request_id })),
        }
    }

    /// A heartbeat frame
    pub fn heartbeat() -> Self {
        Self {
            frame: Some(wire_frame::Frame::Heartbeat(WireHeartbeat {})),
        }
    }

    /// Determine if this is a heartbeat
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.frame, Some(wire_frame::Frame::Heartbeat(_)))
    }
}

impl WireRequest {
    /// Split into the request id and the envelope
    pub fn into_envelope(self) -> (u64, RequestEnvelope) {
        let mut envelope =
            RequestEnvelope::new(self.interface_id, self.method_id, self.arguments);
        envelope.correlation_id = self.correlation_id;
        (self.request_id, envelope)
    }
}

impl WireResponse {
    /// Split into the request id and the envelope. A response without an outcome, or with
    /// an unknown fault kind, is a protocol violation
    pub fn into_envelope(self) -> (u64, Result<ResponseEnvelope, TransportErr>) {
        let envelope = match self.outcome {
            Some(wire_response::Outcome::Payload(payload)) => Ok(ResponseEnvelope::ok(payload)),
            Some(wire_response::Outcome::Fault(fault)) => {
                ResponseFault::try_from(fault).map(ResponseEnvelope::fault)
            }
            None => Err(TransportErr::Protocol(format!(
                "Response {} carries no outcome",
                self.request_id
            ))),
        };
        (self.request_id, envelope)
    }
}

impl From<ResponseFault> for WireFault {
    fn from(value: ResponseFault) -> Self {
        let mut fault = WireFault {
            message: value.to_string(),
            ..Default::default()
        };
        match value {
            ResponseFault::Failed(failure) => {
                fault.set_kind(FaultKind::Failed);
                fault.message = failure.message;
                fault.interface = failure.interface;
                fault.method = failure.method;
            }
            ResponseFault::UnknownInterface(interface_id) => {
                fault.set_kind(FaultKind::UnknownInterface);
                fault.interface_id = interface_id;
            }
            ResponseFault::UnknownMethod {
                interface_id,
                method_id,
            } => {
                fault.set_kind(FaultKind::UnknownMethod);
                fault.interface_id = interface_id;
                fault.method_id = method_id;
            }
            ResponseFault::Decode(reason) => {
                fault.set_kind(FaultKind::Decode);
                fault.message = reason;
            }
            ResponseFault::TargetGone(target) => {
                fault.set_kind(FaultKind::TargetGone);
                fault.message = target;
            }
            ResponseFault::Cancelled => fault.set_kind(FaultKind::Cancelled),
        }
        fault
    }
}

impl TryFrom<WireFault> for ResponseFault {
    type Error = TransportErr;

    fn try_from(value: WireFault) -> Result<Self, Self::Error> {
        let kind = FaultKind::from_i32(value.kind).unwrap_or(FaultKind::Unspecified);
        match kind {
            FaultKind::Failed => Ok(Self::Failed(RemoteFailure {
                interface: value.interface,
                method: value.method,
                message: value.message,
            })),
            FaultKind::UnknownInterface => Ok(Self::UnknownInterface(value.interface_id)),
            FaultKind::UnknownMethod => Ok(Self::UnknownMethod {
                interface_id: value.interface_id,
                method_id: value.method_id,
            }),
            FaultKind::Decode => Ok(Self::Decode(value.message)),
            FaultKind::TargetGone => Ok(Self::TargetGone(value.message)),
            FaultKind::Cancelled => Ok(Self::Cancelled),
            FaultKind::Unspecified => Err(TransportErr::Protocol(format!(
                "Unknown fault kind {}",
                value.kind
            ))),
        }
    }
}
