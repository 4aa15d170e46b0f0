//! Typed AST delivered by the semantic oracle.
//!
//! Nodes are allocated in a `bumpalo` arena and borrowed for `'ast`. Every
//! node is `Copy`; compound children are arena references.

mod decl;
mod expr;
mod ops;
mod stmt;

pub use decl::*;
pub use expr::*;
pub use ops::*;
pub use stmt::*;
