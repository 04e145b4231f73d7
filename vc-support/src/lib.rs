//! Small shared primitives used throughout the `vc` workspace.
//!
//! These exist only to hold the few pieces of generic machinery the rest of
//! the crates need that `std` doesn't already provide as a growable byte
//! buffer or typed array: a monotonic label generator and a path interner.
//! Everywhere else, plain `String`/`Vec<T>` play the role the teacher
//! codebase covers with a hand-rolled generic vector.

mod interner;
mod label;

pub use interner::{InternedPath, PathInterner};
pub use label::LabelGenerator;
