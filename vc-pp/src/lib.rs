//! Line-oriented C preprocessor: macro expansion, conditional compilation,
//! and include resolution (spec §1 component 1, §4).
//!
//! The entry point is [`preprocess`], which drives a [`Resolver`] and a
//! fresh [`PreprocessorContext`] over one translation unit and returns the
//! expanded source text.

mod builtins;
mod cond;
mod context;
mod dispatcher;
mod expander;
mod expr;
mod loader;
mod macro_table;
mod resolver;

pub use cond::{ConditionalFrame, ConditionalStack};
pub use context::{
    IncludeFrame, PreprocessorContext, DEFAULT_MAX_EXPANSION_SIZE, DEFAULT_MAX_INCLUDE_DEPTH,
    DEFAULT_MAX_RECURSION_DEPTH,
};
pub use dispatcher::preprocess;
pub use expander::{expand_line, ExpandingSet};
pub use expr::{Evaluator, ExprError, ExprResult};
pub use loader::{load, normalize, LoadedFile};
pub use macro_table::{Macro, MacroTable, RESERVED_BUILTINS};
pub use resolver::{IncludeKind, MatchedIndex, Resolved, Resolver};
