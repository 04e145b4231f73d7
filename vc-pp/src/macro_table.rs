//! The macro definition table (spec §3 "Macro", §2 row 3).

use std::collections::HashMap;

/// One macro definition.
///
/// The `expanding` flag used by the source to break self-recursion is kept
/// here only as a historical note: per DESIGN NOTES this implementation
/// carries the "currently expanding" set as an explicit auxiliary structure
/// threaded through expansion (see [`crate::expander::ExpandingSet`]) rather
/// than mutable state on the table entry, so the table itself stays
/// read-only during expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    /// True for `#define FOO(...) body`, even with an empty parameter list
    /// (`#define FOO() body`); false for a plain object-like macro.
    pub function_like: bool,
    pub variadic: bool,
    pub body: String,
}

impl Macro {
    /// An object-like macro: no parameter list at all (`#define FOO body`).
    pub fn object_like(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            function_like: false,
            variadic: false,
            body: body.into(),
        }
    }

    /// A function-like macro (`#define FOO(a, b) body`), possibly variadic.
    pub fn function_like(
        name: impl Into<String>,
        params: Vec<String>,
        variadic: bool,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            function_like: true,
            variadic,
            body: body.into(),
        }
    }

    /// Function-like macros take an argument list, even with zero params
    /// (`#define FOO() body`); object-like macros never do.
    pub fn is_function_like(&self) -> bool {
        self.function_like
    }
}

/// Reserved names that always report as "defined" to `defined(...)`, even
/// when absent from the table, per spec §3's Macro invariants.
pub const RESERVED_BUILTINS: &[&str] = &[
    "__FILE__",
    "__LINE__",
    "__DATE__",
    "__TIME__",
    "__STDC__",
    "__STDC_VERSION__",
    "__func__",
    "__COUNTER__",
    "__BASE_FILE__",
    "__INCLUDE_LEVEL__",
    "offsetof",
];

/// Set of macro definitions keyed by name.
///
/// Invariant: at most one macro per name (`define` replaces any prior
/// definition); `undef` is idempotent.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a macro.
    pub fn define(&mut self, m: Macro) {
        self.macros.insert(m.name.clone(), m);
    }

    /// Remove a macro definition. A no-op if it wasn't defined.
    pub fn undef(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// `defined(name)` semantics: true for anything in the table, plus the
    /// reserved builtin names even when the table has no entry for them.
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name) || RESERVED_BUILTINS.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefine_replaces() {
        let mut table = MacroTable::new();
        table.define(Macro::object_like("X", "1"));
        table.define(Macro::object_like("X", "2"));
        assert_eq!(table.lookup("X").unwrap().body, "2");
    }

    #[test]
    fn undef_is_idempotent() {
        let mut table = MacroTable::new();
        table.undef("X");
        table.define(Macro::object_like("X", "1"));
        table.undef("X");
        table.undef("X");
        assert!(table.lookup("X").is_none());
    }

    #[test]
    fn reserved_builtins_are_always_defined() {
        let table = MacroTable::new();
        assert!(table.is_defined("__LINE__"));
        assert!(table.is_defined("__FILE__"));
        assert!(!table.is_defined("NOT_A_MACRO"));
    }

    #[test]
    fn empty_paren_macro_is_function_like() {
        let m = Macro::function_like("FOO", vec![], false, "body");
        assert!(m.is_function_like());
        let obj = Macro::object_like("BAR", "body");
        assert!(!obj.is_function_like());
    }
}
