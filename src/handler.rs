//! Handler capability: objects that want a reference to their materialized unit.
//!
//! The compiler hands the store one handler per generated unit (consequence
//! invokers, eval expressions, predicate expressions). Wiring calls
//! [`Wireable::wire`] with the freshly materialized unit. Handlers that do
//! not expose the capability are skipped without error.

use crate::loader::UnitRef;

/// A value that can be bound to a unit name.
pub trait Handler: Send + Sync + 'static {
    /// The wiring capability, if this handler has one.
    fn as_wireable(&self) -> Option<&dyn Wireable> {
        None
    }
}

/// Receives the materialized unit during wiring.
///
/// Called from worker threads during parallel wiring, so implementations
/// use interior mutability to store the unit.
pub trait Wireable: Send + Sync {
    fn wire(&self, unit: UnitRef);
}

/// Wire `handler` to `unit` if it has the capability.
///
/// Returns whether wiring happened.
pub(crate) fn wire_handler<H: Handler + ?Sized>(handler: &H, unit: UnitRef) -> bool {
    match handler.as_wireable() {
        Some(wireable) => {
            wireable.wire(unit);
            true
        }
        None => false,
    }
}
