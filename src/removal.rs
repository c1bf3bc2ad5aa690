//! Retracting rules and functions: drop the units they generated.
//!
//! Working out which units a rule generated needs the rule model's own
//! traversal (eval conditions, predicate constraints nested in group
//! elements). The store only trusts what [`GeneratedUnits`] reports; an
//! incomplete report leaves stale units behind.

use crate::handler::Handler;
use crate::naming::function_unit_name;
use crate::store::UnitStore;

/// Unit names a compiled rule produced, as reported by the rule model.
pub trait GeneratedUnits {
    /// The consequence unit. Queries have none.
    fn consequence_unit(&self) -> Option<String>;

    /// Eval and predicate expression units found under the rule's conditions.
    fn condition_units(&self) -> Vec<String>;

    /// The rule's own unit.
    fn rule_unit(&self) -> Option<String>;
}

impl<H: Handler> UnitStore<H> {
    /// Remove everything a rule generated.
    ///
    /// The consequence goes first; condition and rule units are only removed
    /// when the consequence was actually stored. Returns the number of blobs
    /// removed.
    pub fn remove_rule(&mut self, rule: &dyn GeneratedUnits) -> usize {
        let Some(consequence) = rule.consequence_unit() else {
            return 0;
        };
        if !self.remove(&consequence) {
            return 0;
        }
        let mut removed = 1 + self.remove_all(rule.condition_units());
        if let Some(rule_unit) = rule.rule_unit() {
            removed += usize::from(self.remove(&rule_unit));
        }
        tracing::debug!(consequence = %consequence, removed, "removed rule units");
        removed
    }

    /// Remove the unit generated for `function` in `namespace`.
    pub fn remove_function(&mut self, namespace: &str, function: &str) -> bool {
        self.remove(&function_unit_name(namespace, function))
    }
}
