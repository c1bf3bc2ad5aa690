//! Store composition: merge one store into another, or clone onto a new parent.

use std::sync::Arc;

use crate::handler::Handler;
use crate::loader::LoaderContext;
use crate::naming::unit_name;

use super::UnitStore;

impl<H: Handler> UnitStore<H> {
    /// Copy `source`'s blobs, bindings and (optionally) definitions into `self`.
    ///
    /// Blobs go through [`UnitStore::write`], so overwrites mark `self` dirty
    /// and new names are queued. With `exclude_definitions`, blobs that the
    /// source also keeps as a definition are skipped and its definition cache
    /// is not copied. Source bindings win on conflict.
    pub fn merge(&mut self, source: &UnitStore<H>, exclude_definitions: bool) {
        let mut copied = 0usize;
        for (key, bytes) in &source.blobs {
            if exclude_definitions && source.defines(key) {
                continue;
            }
            self.write(key.clone(), bytes.clone());
            copied += 1;
        }

        self.bindings.extend(
            source
                .bindings
                .iter()
                .map(|(name, handler)| (name.clone(), Arc::clone(handler))),
        );

        if !exclude_definitions {
            self.definitions.extend(
                source
                    .definitions
                    .iter()
                    .map(|(name, bytes)| (name.clone(), bytes.clone())),
            );
        }

        tracing::info!(
            blobs = copied,
            bindings = source.bindings.len(),
            exclude_definitions,
            dirty = self.is_dirty(),
            "merged unit store"
        );
    }

    /// Build a new store holding a merged copy of `self`, attached to `context`.
    ///
    /// The copy shares this store's scheduler and handler instances.
    pub fn clone_with(&self, context: LoaderContext, exclude_definitions: bool) -> UnitStore<H> {
        let mut copy = UnitStore::with_scheduler(self.scheduler.clone());
        copy.merge(self, exclude_definitions);
        copy.attach(context);
        copy
    }

    /// Whether a definition exists under the key or its unit name.
    fn defines(&self, key: &str) -> bool {
        self.definitions.contains_key(key) || self.definitions.contains_key(&unit_name(key))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::handler::Handler;
    use crate::loader::LoaderContext;
    use crate::store::{UnitStore, WireState};

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    impl Handler for Tag {}

    fn store(entries: &[(&str, &[u8])]) -> UnitStore<Tag> {
        let mut store = UnitStore::new();
        for (name, bytes) in entries {
            store.write(*name, bytes.to_vec());
        }
        store
    }

    #[test]
    fn merge_copies_source_and_keeps_own() {
        let mut target = store(&[("a/Own.unit", b"own"), ("a/Shared.unit", b"old")]);
        let source = store(&[("a/Shared.unit", b"new"), ("a/Extra.unit", b"extra")]);

        target.merge(&source, false);

        assert_eq!(target.read("a/Own.unit"), Some(&b"own"[..]));
        assert_eq!(target.read("a/Shared.unit"), Some(&b"new"[..]));
        assert_eq!(target.read("a/Extra.unit"), Some(&b"extra"[..]));
        // Overwriting a shared blob invalidates the target.
        assert!(target.is_dirty());
    }

    #[test]
    fn merge_of_new_names_queues_them() {
        let mut target: UnitStore<Tag> = UnitStore::new();
        let source = store(&[("a/B.unit", b"1")]);
        target.merge(&source, false);
        assert_eq!(target.state(), &WireState::PendingWire(vec!["a/B.unit".into()]));
    }

    #[test]
    fn source_bindings_win() {
        let mut target: UnitStore<Tag> = UnitStore::new();
        target.put_handler("a.B", Arc::new(Tag("target")));
        target.put_handler("a.Keep", Arc::new(Tag("keep")));
        let mut source: UnitStore<Tag> = UnitStore::new();
        source.put_handler("a.B", Arc::new(Tag("source")));

        target.merge(&source, false);

        assert_eq!(**target.handler("a.B").unwrap(), Tag("source"));
        assert_eq!(**target.handler("a.Keep").unwrap(), Tag("keep"));
    }

    #[test]
    fn exclusion_skips_defined_blobs_and_definitions() {
        let mut source = store(&[("a/Fact.unit", b"fact"), ("a/Rule.unit", b"rule")]);
        source.put_definition("a.Fact", b"def".to_vec());
        let mut target: UnitStore<Tag> = UnitStore::new();

        target.merge(&source, true);

        assert_eq!(target.read("a/Fact.unit"), None);
        assert_eq!(target.read("a/Rule.unit"), Some(&b"rule"[..]));
        assert!(!target.has_definition("a.Fact"));
    }

    #[test]
    fn merge_without_exclusion_copies_definitions() {
        let mut source = store(&[("a/Fact.unit", b"fact")]);
        source.put_definition("a.Fact", b"def".to_vec());
        let mut target: UnitStore<Tag> = UnitStore::new();

        target.merge(&source, false);

        assert_eq!(target.read("a/Fact.unit"), Some(&b"fact"[..]));
        assert!(target.has_definition("a.Fact"));
    }

    #[test]
    fn clone_with_attaches_and_shares_handlers() {
        let mut source = store(&[("a/B.unit", b"1")]);
        let handler = Arc::new(Tag("shared"));
        source.put_handler("a.B", Arc::clone(&handler));

        let copy = source.clone_with(LoaderContext::default(), false);

        assert!(copy.is_attached());
        assert!(!source.is_attached());
        assert_eq!(copy.read("a/B.unit"), Some(&b"1"[..]));
        assert!(Arc::ptr_eq(copy.handler("a.B").unwrap(), &handler));
        assert_eq!(copy.pending(), ["a/B.unit"]);
    }
}
