//! Unit naming: dotted unit names vs. slash-separated store keys.
//!
//! The blob map is keyed by store key (`org/rules/Rule_1.unit`), handler
//! bindings by unit name (`org.rules.Rule_1`). Both conversions are
//! idempotent so callers may pass either form.

/// Suffix carried by every store key.
pub const UNIT_SUFFIX: &str = ".unit";

/// Convert a unit name to its store key. Keys pass through unchanged.
pub fn unit_key(name: &str) -> String {
    if name.ends_with(UNIT_SUFFIX) {
        return name.to_string();
    }
    let mut key = name.replace('.', "/");
    key.push_str(UNIT_SUFFIX);
    key
}

/// Convert a store key back to its unit name. Names pass through unchanged.
pub fn unit_name(key: &str) -> String {
    key.strip_suffix(UNIT_SUFFIX).unwrap_or(key).replace('/', ".")
}

/// Namespace owning a unit: everything before the last dot.
///
/// Units without a dot live in the root namespace (`""`).
pub fn namespace_of(name: &str) -> &str {
    name.rfind('.').map(|idx| &name[..idx]).unwrap_or("")
}

/// Name of the unit generated for a function declared in `namespace`.
pub fn function_unit_name(namespace: &str, function: &str) -> String {
    let mut chars = function.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    if namespace.is_empty() {
        capitalized
    } else {
        format!("{namespace}.{capitalized}")
    }
}
