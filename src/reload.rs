//! Full reload: discard the loader, build a fresh one, rebind every handler.

use std::sync::Arc;

use crate::error::{LoaderError, LoaderResult};
use crate::handler::{Handler, wire_handler};
use crate::store::{UnitStore, WireState};

impl<H: Handler> UnitStore<H> {
    /// Drop every materialized unit and rewire all bindings from scratch.
    ///
    /// The store is dirty for the whole pass and only becomes clean once
    /// every binding has been resolved and wired; any failure leaves it dirty
    /// so the caller can fix the blob and retry.
    pub fn reload(&mut self) -> LoaderResult<()> {
        self.state = WireState::Dirty;

        let Some(previous) = self.loader.take() else {
            // Without a loader there is nothing to rebuild, only bindings to miss.
            if let Some(name) = self.bindings.keys().next() {
                return Err(LoaderError::Detached { name: name.clone() });
            }
            self.state = WireState::Clean;
            return Ok(());
        };
        let loader = self.loader.insert(previous.fresh());
        drop(previous);

        for (name, handler) in &self.bindings {
            let unit = loader.resolve(&self.blobs, name)?;
            wire_handler(handler.as_ref(), Arc::clone(&unit));
        }

        self.state = WireState::Clean;
        tracing::info!(
            bindings = self.bindings.len(),
            blobs = self.blobs.len(),
            "reloaded unit store"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::handler::Wireable;
    use crate::loader::{
        LoaderContext, MaterializeError, Materializer, NoParent, UnitBody, UnitRef,
    };

    #[derive(Default)]
    struct Counter {
        wired: AtomicUsize,
    }

    impl Handler for Counter {
        fn as_wireable(&self) -> Option<&dyn Wireable> {
            Some(self)
        }
    }

    impl Wireable for Counter {
        fn wire(&self, _unit: UnitRef) {
            self.wired.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RejectCorrupt;

    impl Materializer for RejectCorrupt {
        fn materialize(&self, _name: &str, bytes: &[u8]) -> Result<UnitBody, MaterializeError> {
            if bytes == b"corrupt" {
                return Err("bad magic".into());
            }
            Ok(Box::new(bytes.to_vec()))
        }
    }

    fn attached() -> UnitStore<Counter> {
        let mut store = UnitStore::new();
        store.attach(LoaderContext::new(Arc::new(NoParent), Arc::new(RejectCorrupt)));
        store
    }

    #[test]
    fn reload_rebinds_every_handler() {
        let mut store = attached();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        store.write("r/A.unit", b"a".to_vec());
        store.write("r/B.unit", b"b".to_vec());
        store.put_handler("r.A", Arc::clone(&a));
        store.put_handler("r.B", Arc::clone(&b));
        store.mark_dirty();

        store.reload().unwrap();

        assert!(!store.is_dirty());
        assert_eq!(a.wired.load(Ordering::SeqCst), 1);
        assert_eq!(b.wired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reload_without_bindings_is_trivial() {
        let mut store = attached();
        store.mark_dirty();
        store.reload().unwrap();
        assert!(!store.is_dirty());

        let mut detached: UnitStore<Counter> = UnitStore::new();
        detached.mark_dirty();
        detached.reload().unwrap();
        assert!(!detached.is_dirty());
    }

    #[test]
    fn reload_discards_materialized_units() {
        let mut store = attached();
        store.write("r/A.unit", b"a".to_vec());
        let before = store.resolve("r.A").unwrap();
        store.reload().unwrap();
        assert_eq!(store.loader_stats().units, 0);
        let after = store.resolve("r.A").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn failed_reload_stays_dirty_until_fixed() {
        let mut store = attached();
        store.write("r/A.unit", b"corrupt".to_vec());
        store.put_handler("r.A", Arc::new(Counter::default()));

        let err = store.reload().unwrap_err();
        assert!(matches!(err, LoaderError::Materialization { .. }));
        assert!(store.is_dirty());

        store.write("r/A.unit", b"fixed".to_vec());
        store.reload().unwrap();
        assert!(!store.is_dirty());
    }

    #[test]
    fn stale_binding_surfaces_as_not_found() {
        let mut store = attached();
        store.put_handler("r.Stale", Arc::new(Counter::default()));
        let err = store.reload().unwrap_err();
        assert!(matches!(err, LoaderError::UnitNotFound { name } if name == "r.Stale"));
        assert!(store.is_dirty());
    }

    #[test]
    fn dirty_store_reloads_before_execute() {
        let mut store = attached();
        let handler = Arc::new(Counter::default());
        store.write("r/A.unit", b"a".to_vec());
        store.put_handler("r.A", Arc::clone(&handler));
        store.write("r/A.unit", b"a2".to_vec());
        assert!(store.is_dirty());

        store.on_before_execute().unwrap();

        assert!(!store.is_dirty());
        assert_eq!(handler.wired.load(Ordering::SeqCst), 1);
    }
}
