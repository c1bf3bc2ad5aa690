//! Dynamic loader: resolves unit names to materialized units.
//!
//! Resolution checks the cache of already-materialized units, then the
//! store's blobs (under the derived store key), then the parent resolver.
//! Both the unit cache and the namespace registry are `DashMap`s so that
//! parallel wiring slices can resolve concurrently.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{LoaderError, LoaderResult};
use crate::naming::{namespace_of, unit_key};
use crate::store::BlobMap;

/// Opaque executable payload produced by a [`Materializer`].
pub type UnitBody = Box<dyn Any + Send + Sync>;

/// Shared handle to a materialized unit.
pub type UnitRef = Arc<Unit>;

/// Error type materializers report; converted to [`LoaderError::Materialization`].
pub type MaterializeError = Box<dyn std::error::Error + Send + Sync>;

/// A namespace registered by a loader. One instance per name per loader.
#[derive(Debug, PartialEq, Eq)]
pub struct Namespace {
    name: String,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An executable unit materialized from stored bytes or supplied by the parent.
pub struct Unit {
    name: String,
    namespace: Arc<Namespace>,
    body: UnitBody,
}

impl Unit {
    /// Build a unit outside of a loader (used by parent resolvers).
    pub fn new(name: impl Into<String>, body: UnitBody) -> Self {
        let name = name.into();
        let namespace = Arc::new(Namespace {
            name: namespace_of(&name).to_string(),
        });
        Self {
            name,
            namespace,
            body,
        }
    }

    /// Dotted unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Borrow the body as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("namespace", &self.namespace.name)
            .finish()
    }
}

/// Compiler adapter turning stored bytes into an executable body.
pub trait Materializer: Send + Sync {
    fn materialize(&self, name: &str, bytes: &[u8]) -> Result<UnitBody, MaterializeError>;
}

/// Identity adapter: the body is a copy of the blob bytes (`Vec<u8>`).
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesMaterializer;

impl Materializer for BytesMaterializer {
    fn materialize(&self, _name: &str, bytes: &[u8]) -> Result<UnitBody, MaterializeError> {
        Ok(Box::new(bytes.to_vec()))
    }
}

/// Fallback resolution source consulted on a local miss.
pub trait ParentResolver: Send + Sync {
    /// Resolve a unit the local store does not hold.
    fn resolve(&self, name: &str) -> Option<UnitRef>;

    /// Raw definition bytes for `name`, if the parent keeps them.
    fn definition(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Parent that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParent;

impl ParentResolver for NoParent {
    fn resolve(&self, _name: &str) -> Option<UnitRef> {
        None
    }
}

/// Everything a store needs to build a loader: parent and compiler adapter.
#[derive(Clone)]
pub struct LoaderContext {
    pub parent: Arc<dyn ParentResolver>,
    pub materializer: Arc<dyn Materializer>,
}

impl LoaderContext {
    pub fn new(parent: Arc<dyn ParentResolver>, materializer: Arc<dyn Materializer>) -> Self {
        Self {
            parent,
            materializer,
        }
    }
}

impl Default for LoaderContext {
    fn default() -> Self {
        Self::new(Arc::new(NoParent), Arc::new(BytesMaterializer))
    }
}

impl fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderContext").finish_non_exhaustive()
    }
}

/// Counters describing a loader's caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderStats {
    pub units: usize,
    pub namespaces: usize,
}

/// Resolves names to units, caching everything it materializes.
///
/// A loader is discarded wholesale on reload; a fresh one starts with empty
/// caches.
pub struct DynamicLoader {
    context: LoaderContext,
    units: DashMap<String, UnitRef>,
    namespaces: DashMap<String, Arc<Namespace>>,
}

impl DynamicLoader {
    pub fn new(context: LoaderContext) -> Self {
        Self {
            context,
            units: DashMap::new(),
            namespaces: DashMap::new(),
        }
    }

    /// A new loader over the same context with empty caches.
    pub fn fresh(&self) -> Self {
        Self::new(self.context.clone())
    }

    pub fn context(&self) -> &LoaderContext {
        &self.context
    }

    /// Resolve `name` against the cache, then `blobs`, then the parent.
    pub fn resolve(&self, blobs: &BlobMap, name: &str) -> LoaderResult<UnitRef> {
        if let Some(unit) = self.units.get(name) {
            return Ok(Arc::clone(unit.value()));
        }

        if let Some(bytes) = blobs.get(&unit_key(name)) {
            let namespace = self.register_namespace(namespace_of(name));
            let body = self
                .context
                .materializer
                .materialize(name, bytes)
                .map_err(|e| LoaderError::Materialization {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            let unit = Arc::new(Unit {
                name: name.to_string(),
                namespace,
                body,
            });
            tracing::debug!(unit = name, bytes = bytes.len(), "materialized unit");

            // A concurrent resolver may have won the race; keep its unit.
            let cached = self.units.entry(name.to_string()).or_insert(unit);
            return Ok(Arc::clone(cached.value()));
        }

        self.context
            .parent
            .resolve(name)
            .ok_or_else(|| LoaderError::UnitNotFound {
                name: name.to_string(),
            })
    }

    /// Whether `name` has already been materialized by this loader.
    pub fn is_cached(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            units: self.units.len(),
            namespaces: self.namespaces.len(),
        }
    }

    /// Register a namespace exactly once. The entry API holds the shard lock
    /// across check-and-insert, so concurrent first registrations agree.
    fn register_namespace(&self, name: &str) -> Arc<Namespace> {
        if let Some(existing) = self.namespaces.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.namespaces.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(namespace = name, "registered namespace");
            Arc::new(Namespace {
                name: name.to_string(),
            })
        });
        Arc::clone(entry.value())
    }
}

impl fmt::Debug for DynamicLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLoader")
            .field("units", &self.units.len())
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}
