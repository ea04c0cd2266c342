// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Interface details registry
//!
//! Maps interface ids and wire names onto the metadata a receiver needs to decode a
//! request or response without the caller's static types. Entries are added as builds
//! complete and are never removed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::mapref::entry::Entry::{Occupied, Vacant};
use dashmap::DashMap;

use crate::{BuildErr, InterfaceDescription, InterfaceId, InterfaceType, MethodId, TypeDescriptor};

/// The registered metadata of one interface
#[derive(Debug, Clone)]
pub struct InterfaceDetails {
    /// The interface's id
    pub id: InterfaceId,
    /// The interface's wire name
    pub name: &'static str,
    /// The interface type
    pub interface_type: InterfaceType,
    /// Every argument and result type carried by the interface's methods
    pub known_types: BTreeSet<TypeDescriptor>,
    /// Method names by method id
    pub methods: BTreeMap<MethodId, &'static str>,
}

impl InterfaceDetails {
    fn from_description(description: &InterfaceDescription) -> Self {
        Self {
            id: description.id,
            name: description.name,
            interface_type: description.interface_type,
            known_types: description.known_types(),
            methods: description
                .methods
                .iter()
                .map(|method| (method.id, method.name))
                .collect(),
        }
    }

    /// The name of the method `method_id`
    pub fn method_name(&self, method_id: MethodId) -> Option<&'static str> {
        self.methods.get(&method_id).copied()
    }
}

/// Lookup of interface details by id and by name
#[derive(Default)]
pub struct InterfaceDetailsRegistry {
    by_id: DashMap<InterfaceId, Arc<InterfaceDetails>>,
    by_name: DashMap<&'static str, InterfaceId>,
}

impl InterfaceDetailsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the details of a described interface. Registering the same interface
    /// again returns the existing entry
    ///
    /// Returns [Err(BuildErr::InterfaceIdCollision)] when a different interface already
    /// holds the id and [Err(BuildErr::InterfaceNameCollision)] when one holds the wire name
    pub fn register(
        &self,
        description: &InterfaceDescription,
    ) -> Result<Arc<InterfaceDetails>, BuildErr> {
        // the name is held while the id is claimed, always in this order
        let name = self.by_name.entry(description.name);
        if let Occupied(claimed) = &name {
            let claimed = *claimed.get();
            if claimed != description.id {
                return Err(self.name_collision(claimed, description));
            }
        }
        let details = match self.by_id.entry(description.id) {
            Occupied(occupied) => return Self::reuse(occupied.get(), description),
            Vacant(vacancy) => {
                let details = Arc::new(InterfaceDetails::from_description(description));
                vacancy.insert(details.clone());
                details
            }
        };
        name.or_insert(description.id);
        log::debug!(
            "Registered interface '{}' with id {}",
            description.name,
            description.id
        );
        Ok(details)
    }

    /// Register every description of a hierarchy, or none of them when any would collide
    ///
    /// Batches are atomic with respect to each other only when registered under a common
    /// lock, as the [crate::BuildCache] does
    pub fn register_all(
        &self,
        descriptions: &[Arc<InterfaceDescription>],
    ) -> Result<Vec<Arc<InterfaceDetails>>, BuildErr> {
        let mut names: HashMap<&'static str, &InterfaceDescription> = HashMap::new();
        for description in descriptions.iter() {
            self.check(description)?;
            if let Some(earlier) = names.insert(description.name, &**description) {
                if earlier.id != description.id {
                    return Err(BuildErr::InterfaceNameCollision {
                        name: description.name.to_string(),
                        existing: earlier.interface_type.rust_name().to_string(),
                        incoming: description.interface_type.rust_name().to_string(),
                    });
                }
            }
        }
        descriptions
            .iter()
            .map(|description| self.register(description))
            .collect()
    }

    /// Determine whether `description` can be registered, without registering it.
    /// Returns the existing entry when the interface is already registered
    pub fn check(
        &self,
        description: &InterfaceDescription,
    ) -> Result<Option<Arc<InterfaceDetails>>, BuildErr> {
        if let Some(existing) = self.lookup_by_id(description.id) {
            return Self::reuse(&existing, description).map(Some);
        }
        let claimed = self.by_name.get(description.name).map(|entry| *entry.value());
        match claimed {
            Some(claimed) => Err(self.name_collision(claimed, description)),
            None => Ok(None),
        }
    }

    fn reuse(
        existing: &Arc<InterfaceDetails>,
        description: &InterfaceDescription,
    ) -> Result<Arc<InterfaceDetails>, BuildErr> {
        if existing.interface_type == description.interface_type {
            Ok(existing.clone())
        } else {
            Err(BuildErr::InterfaceIdCollision {
                id: description.id,
                existing: existing.name.to_string(),
                incoming: description.name.to_string(),
            })
        }
    }

    fn name_collision(
        &self,
        claimed: InterfaceId,
        description: &InterfaceDescription,
    ) -> BuildErr {
        let existing = self
            .by_id
            .get(&claimed)
            .map(|entry| entry.value().interface_type.rust_name())
            .unwrap_or(description.name);
        BuildErr::InterfaceNameCollision {
            name: description.name.to_string(),
            existing: existing.to_string(),
            incoming: description.interface_type.rust_name().to_string(),
        }
    }

    /// Find an interface by id
    pub fn lookup_by_id(&self, id: InterfaceId) -> Option<Arc<InterfaceDetails>> {
        self.by_id.get(&id).map(|entry| entry.value().clone())
    }

    /// Find an interface by wire name
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<InterfaceDetails>> {
        let id = self.by_name.get(name).map(|entry| *entry.value())?;
        self.lookup_by_id(id)
    }

    /// The number of registered interfaces
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
