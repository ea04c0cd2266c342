// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The build cache
//!
//! [BuildCache] is the memoizing front door for everything built from an interface type:
//! descriptions, dispatcher sets and proxy generators. Each artifact is built at most once per
//! cache and shared, immutable, by every caller afterwards.
//!
//! Cache hits are lock-free reads against fully published entries. A miss takes the single
//! build lock, re-checks the cache, builds, registers the interface details and only then
//! publishes the artifact. The lock is reentrant, as building one interface's artifact
//! describes its ancestor interfaces through the same cache on the same thread.
//!
//! A process-wide cache is available through [BuildCache::global] and the free functions of
//! this module. Tests and embedders can create their own isolated instances with [BuildCache::new].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use remoting::{BuildCache, IdScheme, InterfaceSignature, InterfaceType, MethodSignature, RemoteInterface};
//!
//! trait Clock: Send + Sync {}
//!
//! impl RemoteInterface for dyn Clock {
//!     fn signature() -> InterfaceSignature {
//!         InterfaceSignature::marker("Clock").method(MethodSignature::new("now").returns::<u64>())
//!     }
//! }
//!
//! let cache = BuildCache::new(IdScheme::ContentHash);
//! let first = cache.get_or_describe(InterfaceType::of::<dyn Clock>()).unwrap();
//! let second = cache.get_or_describe(InterfaceType::of::<dyn Clock>()).unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::dispatch::{DispatcherSet, InvokerBinder, ServiceInterface};
use crate::proxy::{ProxyGenerator, ProxyInterface};
use crate::{BuildErr, IdScheme, InterfaceDescription, InterfaceId, InterfaceType};

mod registry;

pub use registry::{InterfaceDetails, InterfaceDetailsRegistry};


type ArtifactKey = (TypeId, TypeId);

/// Memoizes the descriptions and artifacts built from interface types
pub struct BuildCache {
    scheme: IdScheme,
    lock: ReentrantMutex<()>,
    descriptions: DashMap<TypeId, Arc<InterfaceDescription>>,
    artifacts: DashMap<ArtifactKey, Arc<dyn Any + Send + Sync>>,
    registry: InterfaceDetailsRegistry,
    builds: AtomicUsize,
}

static GLOBAL_CACHE: OnceCell<BuildCache> = OnceCell::new();

impl Default for BuildCache {
    fn default() -> Self {
        Self::new(IdScheme::default())
    }
}

impl BuildCache {
    /// Create an empty cache assigning ids with `scheme`
    pub fn new(scheme: IdScheme) -> Self {
        Self {
            scheme,
            lock: ReentrantMutex::new(()),
            descriptions: DashMap::new(),
            artifacts: DashMap::new(),
            registry: InterfaceDetailsRegistry::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// The process-wide cache, using the default [IdScheme]
    pub fn global() -> &'static BuildCache {
        GLOBAL_CACHE.get_or_init(BuildCache::default)
    }

    /// The id scheme of this cache
    pub fn scheme(&self) -> IdScheme {
        self.scheme
    }

    /// The registry populated by this cache's builds
    pub fn registry(&self) -> &InterfaceDetailsRegistry {
        &self.registry
    }

    /// The number of artifacts built so far
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Acquire)
    }

    /// Retrieve the description of a single interface, describing it on first use
    pub fn get_or_describe(
        &self,
        interface: InterfaceType,
    ) -> Result<Arc<InterfaceDescription>, BuildErr> {
        if let Some(hit) = self.descriptions.get(&interface.type_id()) {
            return Ok(hit.value().clone());
        }

        let _guard = self.lock.lock();
        if let Some(hit) = self.descriptions.get(&interface.type_id()) {
            return Ok(hit.value().clone());
        }
        log::debug!("Describing interface {}", interface.rust_name());
        let description = Arc::new(InterfaceDescription::describe(interface, self.scheme)?);
        self.descriptions
            .insert(interface.type_id(), description.clone());
        Ok(description)
    }

    /// Retrieve the descriptions of an interface and each unique ancestor, the interface first
    pub fn get_or_describe_hierarchy(
        &self,
        interface: InterfaceType,
    ) -> Result<Vec<Arc<InterfaceDescription>>, BuildErr> {
        let _guard = self.lock.lock();
        InterfaceDescription::walk_hierarchy(interface, |next| self.get_or_describe(next))
    }

    /// Retrieve the dispatcher set serving the interface `I` on targets of type `T`,
    /// building it on first use
    pub fn get_or_build_dispatcher<I, T>(&self) -> Result<Arc<DispatcherSet<T>>, BuildErr>
    where
        I: ServiceInterface<T> + ?Sized,
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_or_build(InterfaceType::of::<I>(), |descriptions| {
            let binder = InvokerBinder::<T>::of::<I>();
            DispatcherSet::build(descriptions, &binder)
        })
    }

    /// Retrieve the proxy generator for the interface `I`, building it on first use
    pub fn get_or_build_proxy_generator<I>(&self) -> Result<Arc<ProxyGenerator<I>>, BuildErr>
    where
        I: ProxyInterface + ?Sized,
    {
        self.get_or_build(InterfaceType::of::<I>(), ProxyGenerator::<I>::build)
    }

    /// Find a registered interface by id
    pub fn lookup_interface_details(&self, id: InterfaceId) -> Option<Arc<InterfaceDetails>> {
        self.registry.lookup_by_id(id)
    }

    /// Find a registered interface by wire name
    pub fn lookup_interface_details_by_name(&self, name: &str) -> Option<Arc<InterfaceDetails>> {
        self.registry.lookup_by_name(name)
    }

    fn lookup<A: Any + Send + Sync>(&self, key: &ArtifactKey) -> Option<Arc<A>> {
        let artifact = self.artifacts.get(key)?.value().clone();
        artifact.downcast::<A>().ok()
    }

    fn get_or_build<A, F>(&self, interface: InterfaceType, build: F) -> Result<Arc<A>, BuildErr>
    where
        A: Any + Send + Sync,
        F: FnOnce(&[Arc<InterfaceDescription>]) -> Result<A, BuildErr>,
    {
        let key = (interface.type_id(), TypeId::of::<A>());
        if let Some(hit) = self.lookup::<A>(&key) {
            return Ok(hit);
        }

        let _guard = self.lock.lock();
        // another caller may have built it while we waited on the lock
        if let Some(hit) = self.lookup::<A>(&key) {
            return Ok(hit);
        }

        log::debug!(
            "Building {} for interface {}",
            std::any::type_name::<A>(),
            interface.rust_name()
        );
        let descriptions = self.get_or_describe_hierarchy(interface)?;
        let artifact = Arc::new(build(&descriptions)?);
        self.registry.register_all(&descriptions)?;

        self.artifacts.insert(key, artifact.clone());
        self.builds.fetch_add(1, Ordering::AcqRel);
        log::debug!(
            "Published {} for interface {}",
            std::any::type_name::<A>(),
            interface.rust_name()
        );
        Ok(artifact)
    }
}

/// Retrieve the dispatcher set serving the interface `I` on targets of type `T` from the
/// process-wide cache
pub fn get_or_create_dispatcher<I, T>() -> Result<Arc<DispatcherSet<T>>, BuildErr>
where
    I: ServiceInterface<T> + ?Sized,
    T: ?Sized + Send + Sync + 'static,
{
    BuildCache::global().get_or_build_dispatcher::<I, T>()
}

/// Retrieve the proxy generator for the interface `I` from the process-wide cache
pub fn get_or_create_proxy_generator<I>() -> Result<Arc<ProxyGenerator<I>>, BuildErr>
where
    I: ProxyInterface + ?Sized,
{
    BuildCache::global().get_or_build_proxy_generator::<I>()
}

/// Find an interface registered in the process-wide cache by id
pub fn lookup_interface_details(id: InterfaceId) -> Option<Arc<InterfaceDetails>> {
    BuildCache::global().lookup_interface_details(id)
}

/// Find an interface registered in the process-wide cache by wire name
pub fn lookup_interface_details_by_name(name: &str) -> Option<Arc<InterfaceDetails>> {
    BuildCache::global().lookup_interface_details_by_name(name)
}
