//! Wiring state of a unit store.

/// Whether the materialized/bound state agrees with the blob map.
///
/// A tagged variant instead of a dirty flag plus a queue: `Dirty` carries no
/// queue, so "dirty implies nothing pending" holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WireState {
    /// Everything written so far is bound.
    #[default]
    Clean,
    /// New keys written since the last reload, in write order.
    PendingWire(Vec<String>),
    /// Materialized state is stale; only a full reload fixes it.
    Dirty,
}

impl WireState {
    pub fn is_dirty(&self) -> bool {
        matches!(self, WireState::Dirty)
    }

    /// Keys awaiting incremental wiring (empty unless `PendingWire`).
    pub fn pending(&self) -> &[String] {
        match self {
            WireState::PendingWire(queue) => queue,
            _ => &[],
        }
    }

    /// A new key was written. Dirty stores do not queue: reload subsumes it.
    pub(crate) fn on_insert(&mut self, key: &str) {
        match self {
            WireState::Clean => *self = WireState::PendingWire(vec![key.to_string()]),
            WireState::PendingWire(queue) => queue.push(key.to_string()),
            WireState::Dirty => {}
        }
    }

    /// An existing blob was replaced or removed.
    pub(crate) fn invalidate(&mut self) {
        *self = WireState::Dirty;
    }

    /// Drop `key` from the queue if present.
    pub(crate) fn forget(&mut self, key: &str) {
        if let WireState::PendingWire(queue) = self {
            queue.retain(|queued| queued != key);
            if queue.is_empty() {
                *self = WireState::Clean;
            }
        }
    }

    /// Take the queue out, leaving `Clean`. Dirty and clean states yield nothing.
    pub(crate) fn take_pending(&mut self) -> Vec<String> {
        match std::mem::take(self) {
            WireState::PendingWire(queue) => queue,
            WireState::Dirty => {
                *self = WireState::Dirty;
                Vec::new()
            }
            WireState::Clean => Vec::new(),
        }
    }
}
