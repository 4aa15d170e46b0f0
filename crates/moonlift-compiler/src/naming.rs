//! Name resolution: source identifiers to generated Lua identifiers.
//!
//! A [`NameTable`] is one scope's view of the identifiers already taken. A
//! function's table starts as a copy of its enclosing table (the package
//! table for top-level functions), so a name chosen inside a closure never
//! shadows something the closure can see, and nothing chosen inside leaks
//! back out.

use rustc_hash::{FxHashMap, FxHashSet};

/// Lua reserved words.
pub const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Names the generated scaffolding relies on.
pub const SCAFFOLD_NAMES: &[&str] = &[
    "__rt", "__pkg", "__s", "__r", "__f", "__c", "__defers", "__res", "__b", "__v", "__x", "self",
];

/// Lua globals the generated code calls by bare name.
pub const LUA_GLOBALS: &[&str] = &["math", "string", "table", "pcall", "require", "error"];

/// Whether `name` can never be used for a source object.
pub fn is_reserved(name: &str) -> bool {
    LUA_KEYWORDS.contains(&name)
        || SCAFFOLD_NAMES.contains(&name)
        || LUA_GLOBALS.contains(&name)
}

/// Turn a source identifier into a valid Lua identifier.
///
/// Non-ASCII characters become `_uXXXX`; identifiers starting with `__`
/// are prefixed with `x` so they never collide with generated names.
pub fn encode_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    if name.starts_with("__") {
        out.push('x');
    }
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push_str(&format!("_u{:04X}", ch as u32));
        }
    }
    if out.is_empty() {
        out.push_str("param");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Lua key for a struct field or method: fields live in tables, so only
/// keywords need escaping.
pub fn field_name(name: &str) -> String {
    let encoded = encode_ident(name);
    if LUA_KEYWORDS.contains(&encoded.as_str()) {
        format!("{encoded}_")
    } else {
        encoded
    }
}

/// Identifiers taken in one scope, plus per-prefix suffix counters.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    used: FxHashSet<String>,
    counters: FxHashMap<String, u32>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as taken.
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Allocate a fresh identifier derived from `base`.
    pub fn allocate(&mut self, base: &str) -> String {
        let base = encode_ident(base);
        if !is_reserved(&base) && !self.used.contains(&base) {
            self.used.insert(base.clone());
            return base;
        }
        let counter = self.counters.entry(base.clone()).or_insert(1);
        loop {
            let candidate = format!("{base}_{counter}");
            *counter += 1;
            if !is_reserved(&candidate) && !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_get_suffixed() {
        let mut table = NameTable::new();
        assert_eq!(table.allocate("end"), "end_1");
        assert_eq!(table.allocate("self"), "self_1");
        assert_eq!(table.allocate("x"), "x");
        assert_eq!(table.allocate("x"), "x_1");
        assert_eq!(table.allocate("x"), "x_2");
    }

    #[test]
    fn lua_globals_are_not_shadowed() {
        let mut table = NameTable::new();
        assert_eq!(table.allocate("math"), "math_1");
        assert_eq!(table.allocate("string"), "string_1");
        assert_eq!(table.allocate("pcall"), "pcall_1");
    }

    #[test]
    fn suffix_skips_taken_names() {
        let mut table = NameTable::new();
        table.reserve("v");
        table.reserve("v_1");
        assert_eq!(table.allocate("v"), "v_2");
    }

    #[test]
    fn non_ascii_is_encoded() {
        assert_eq!(encode_ident("größe"), "gr_u00F6_u00DFe");
        assert_eq!(encode_ident("__type"), "x__type");
        assert_eq!(encode_ident(""), "param");
    }

    #[test]
    fn copies_do_not_leak_back() {
        let mut outer = NameTable::new();
        outer.allocate("a");
        let mut inner = outer.clone();
        assert_eq!(inner.allocate("a"), "a_1");
        inner.allocate("b");
        assert!(!outer.contains("b"));
        assert_eq!(outer.allocate("b"), "b");
    }

    #[test]
    fn field_names_escape_keywords() {
        assert_eq!(field_name("end"), "end_");
        assert_eq!(field_name("Name"), "Name");
    }
}
