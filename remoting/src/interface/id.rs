// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Interface and method id derivation

use sha2::{Digest, Sha256};

use super::{InterfaceSignature, MethodSignature};
use crate::{InterfaceId, MethodId};

/// How interface and method ids are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdScheme {
    /// Method ids are the method's declaration position. Both sides must declare methods
    /// in the same order. The interface id is derived from the interface name only
    Legacy,
    /// Ids are hashed from canonical renderings of the signatures, so either side may
    /// reorder or add methods as long as the shared signatures match
    #[default]
    ContentHash,
}

impl IdScheme {
    pub(crate) fn interface_id(&self, signature: &InterfaceSignature) -> InterfaceId {
        match self {
            Self::Legacy => stable_hash(signature.name),
            Self::ContentHash => {
                let methods = signature
                    .methods
                    .iter()
                    .map(MethodSignature::canonical)
                    .collect::<Vec<_>>()
                    .join(";");
                stable_hash(&format!("{}{{{methods}}}", signature.name))
            }
        }
    }

    pub(crate) fn method_id(&self, ordinal: usize, method: &MethodSignature) -> MethodId {
        match self {
            Self::Legacy => ordinal as MethodId,
            Self::ContentHash => stable_hash(&method.canonical()),
        }
    }
}

/// The first four bytes of the SHA-256 digest, big-endian
pub(crate) fn stable_hash(input: &str) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
