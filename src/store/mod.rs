//! Unit store: compiled blobs, handler bindings, and definition cache.
//!
//! The store owns three maps:
//!
//! - blobs keyed by store key, the only source the loader materializes from
//! - handler bindings keyed by unit name
//! - unit definitions kept for introspection and export
//!
//! Every mutation goes through here so that [`WireState`] stays in step with
//! the blob map. Operations are not synchronized against each other; callers
//! drive a store from a single coordinating thread.

pub mod merge;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

pub use state::WireState;

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, LoaderError, LoaderResult};
use crate::handler::{Handler, wire_handler};
use crate::loader::{DynamicLoader, LoaderContext, LoaderStats, UnitRef};
use crate::naming::{unit_key, unit_name};
use crate::wiring::WiringScheduler;

/// Blob map: store key → compiled bytes.
pub type BlobMap = HashMap<String, Vec<u8>>;

/// Handler bindings: unit name → shared handler.
pub type BindingMap<H> = HashMap<String, Arc<H>>;

/// Named compiled units plus the handlers wired to them.
pub struct UnitStore<H> {
    pub(crate) blobs: BlobMap,
    pub(crate) bindings: BindingMap<H>,
    pub(crate) definitions: HashMap<String, Vec<u8>>,
    pub(crate) state: WireState,
    pub(crate) loader: Option<DynamicLoader>,
    pub(crate) scheduler: WiringScheduler,
}

impl<H: Handler> UnitStore<H> {
    /// Create an empty, detached store with the default scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(WiringScheduler::default())
    }

    pub fn with_scheduler(scheduler: WiringScheduler) -> Self {
        Self {
            blobs: HashMap::new(),
            bindings: HashMap::new(),
            definitions: HashMap::new(),
            state: WireState::Clean,
            loader: None,
            scheduler,
        }
    }

    /// Create an empty store using the `[wiring]` section of `config`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_scheduler(WiringScheduler::new(&config.wiring)?))
    }

    // -----------------------------------------------------------------------
    // Loader lifecycle
    // -----------------------------------------------------------------------

    /// Attach to a parent resolver and compiler adapter, building the loader.
    pub fn attach(&mut self, context: LoaderContext) {
        self.loader = Some(DynamicLoader::new(context));
    }

    /// Drop the loader and every unit it materialized.
    pub fn detach(&mut self) {
        self.loader = None;
    }

    pub fn is_attached(&self) -> bool {
        self.loader.is_some()
    }

    pub fn loader(&self) -> Option<&DynamicLoader> {
        self.loader.as_ref()
    }

    pub fn loader_stats(&self) -> LoaderStats {
        self.loader.as_ref().map(DynamicLoader::stats).unwrap_or_default()
    }

    pub fn scheduler(&self) -> &WiringScheduler {
        &self.scheduler
    }

    // -----------------------------------------------------------------------
    // Blobs
    // -----------------------------------------------------------------------

    /// Insert or overwrite a blob under `name`, taken verbatim as the key.
    ///
    /// Compiled units belong under their store key (`a/B.unit`) so the loader
    /// and wiring find them; other names are stored as opaque resources.
    /// Overwriting marks the store dirty and drops the pending queue. A new
    /// key is queued for incremental wiring unless the store is already dirty.
    pub fn write(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        if self.blobs.insert(name.clone(), bytes).is_some() {
            tracing::debug!(unit = %name, "blob replaced, store marked dirty");
            self.state.invalidate();
        } else {
            self.state.on_insert(&name);
        }
    }

    /// Bytes stored under `name` exactly as written.
    pub fn read(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(Vec::as_slice)
    }

    /// Raw resource lookup by store key.
    pub fn resource(&self, key: &str) -> Option<&[u8]> {
        self.read(key)
    }

    /// Compiled bytes for a unit name or key, falling back to the parent.
    pub fn bytecode(&self, name: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.blobs.get(&unit_key(name)) {
            return Some(bytes.clone());
        }
        self.loader
            .as_ref()
            .and_then(|loader| loader.context().parent.definition(&unit_name(name)))
    }

    /// Remove a unit's binding and blob. `name` may be a unit name or key;
    /// an exact key match wins over the derived store key.
    ///
    /// Returns `true` only when a blob was actually present.
    pub fn remove(&mut self, name: &str) -> bool {
        let key = if self.blobs.contains_key(name) {
            name.to_string()
        } else {
            unit_key(name)
        };
        self.bindings.remove(&unit_name(&key));
        if self.blobs.remove(&key).is_some() {
            self.state.forget(&key);
            self.state.invalidate();
            true
        } else {
            false
        }
    }

    /// Remove several units, returning how many blobs were present.
    pub fn remove_all<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| self.remove(name.as_ref()))
            .count()
    }

    /// Empty blobs and bindings, then reload.
    pub fn clear(&mut self) -> LoaderResult<()> {
        self.blobs.clear();
        self.bindings.clear();
        self.reload()
    }

    /// Current blob keys, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.blobs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &WireState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// Keys waiting for incremental wiring.
    pub fn pending(&self) -> &[String] {
        self.state.pending()
    }

    /// Force the next cycle to perform a full reload.
    pub fn mark_dirty(&mut self) {
        self.state.invalidate();
    }

    // -----------------------------------------------------------------------
    // Handler bindings
    // -----------------------------------------------------------------------

    pub fn put_handler(&mut self, name: impl Into<String>, handler: Arc<H>) {
        self.bindings.insert(name.into(), handler);
    }

    /// Insert every binding; incoming values win on conflict.
    pub fn put_all_handlers<I>(&mut self, handlers: I)
    where
        I: IntoIterator<Item = (String, Arc<H>)>,
    {
        self.bindings.extend(handlers);
    }

    pub fn remove_handler(&mut self, name: &str) -> Option<Arc<H>> {
        self.bindings.remove(name)
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<H>> {
        self.bindings.get(name)
    }

    pub fn handlers(&self) -> impl Iterator<Item = (&str, &Arc<H>)> {
        self.bindings.iter().map(|(name, h)| (name.as_str(), h))
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    pub fn put_definition(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.definitions.insert(name.into(), bytes);
    }

    pub fn put_all_definitions<I>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        self.definitions.extend(definitions);
    }

    pub fn remove_definition(&mut self, name: &str) -> Option<Vec<u8>> {
        self.definitions.remove(name)
    }

    /// Definition bytes for `name`, fetched from the parent and cached on a local miss.
    pub fn definition(&mut self, name: &str) -> Option<&[u8]> {
        if !self.definitions.contains_key(name) {
            let fetched = self
                .loader
                .as_ref()
                .and_then(|loader| loader.context().parent.definition(name))?;
            self.definitions.insert(name.to_string(), fetched);
        }
        self.definitions.get(name).map(Vec::as_slice)
    }

    pub fn has_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.definitions
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// Resolve `name` and wire its bound handler, if any.
    pub fn wire(&self, name: &str) -> LoaderResult<UnitRef> {
        let name = unit_name(name);
        let unit = self.resolve(&name)?;
        if let Some(handler) = self.bindings.get(&name) {
            wire_handler(handler.as_ref(), Arc::clone(&unit));
        }
        Ok(unit)
    }

    /// Resolve `name` and wire the given handler instead of the bound one.
    pub fn wire_with(&self, name: &str, handler: &H) -> LoaderResult<UnitRef> {
        let unit = self.resolve(&unit_name(name))?;
        wire_handler(handler, Arc::clone(&unit));
        Ok(unit)
    }

    /// Resolve a unit through the current loader.
    pub fn resolve(&self, name: &str) -> LoaderResult<UnitRef> {
        let loader = self.loader.as_ref().ok_or_else(|| LoaderError::Detached {
            name: name.to_string(),
        })?;
        loader.resolve(&self.blobs, name)
    }

    /// Reconcile pending state before an evaluation cycle.
    ///
    /// A dirty store reloads. Otherwise queued keys are wired, serially or in
    /// parallel. The queue is emptied either way; a failed pass leaves the
    /// store dirty so the next cycle reloads.
    pub fn on_before_execute(&mut self) -> LoaderResult<()> {
        if self.state.is_dirty() {
            return self.reload();
        }

        let pending = self.state.take_pending();
        if pending.is_empty() {
            return Ok(());
        }

        let Some(loader) = self.loader.as_ref() else {
            self.state.invalidate();
            return Err(LoaderError::Detached {
                name: unit_name(&pending[0]),
            });
        };

        if let Err(e) = self
            .scheduler
            .wire_all(loader, &self.blobs, &self.bindings, &pending)
        {
            tracing::warn!(error = %e, units = pending.len(), "incremental wiring failed, store marked dirty");
            self.state.invalidate();
            return Err(e);
        }
        tracing::debug!(units = pending.len(), "wired pending units");
        Ok(())
    }
}

impl<H: Handler> Default for UnitStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for UnitStore<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.blobs.keys().collect();
        names.sort();
        f.debug_struct("UnitStore")
            .field("blobs", &names)
            .field("bindings", &self.bindings.len())
            .field("definitions", &self.definitions.len())
            .field("state", &self.state)
            .field("attached", &self.loader.is_some())
            .finish()
    }
}
