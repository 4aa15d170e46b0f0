//! Core types shared by the moonlift crates.
//!
//! This crate models the output of the semantic oracle: the typed AST
//! ([`ast`]), types ([`TypeTable`]), resolved objects ([`ObjectTable`]) and
//! the facts tying them together ([`SemanticInfo`]). It also owns the error
//! type every translation phase reports through.

pub mod ast;
pub mod builder;
pub mod error;
pub mod ids;
pub mod object;
pub mod semantic;
pub mod span;
pub mod type_hash;
pub mod types;

pub use builder::ProgramBuilder;
pub use error::{CompilationError, Diagnostics, Result};
pub use ids::{NodeId, ObjectId, TypeId};
pub use object::{Object, ObjectKind, ObjectTable, ScopeLevel};
pub use semantic::{FuncInfo, Selection, SelectionKind, SemanticInfo};
pub use span::Span;
pub use type_hash::TypeHash;
pub use types::{
    BasicKind, ChanDir, InterfaceType, NamedType, Signature, StructType, Type, TypeTable,
};

pub use bumpalo::Bump;
