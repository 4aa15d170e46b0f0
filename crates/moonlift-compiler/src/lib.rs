//! Translation of oracle-typed packages into Lua for a cooperative fiber
//! runtime.
//!
//! The entry point is [`compile_package`]. Function bodies without a
//! blocking operation become plain Lua functions; bodies with one are
//! flattened into a resumable dispatch loop whose case graph is also
//! returned as a [`StateMachine`] that can be stepped without a Lua VM.
//!
//! # Example
//!
//! ```
//! use moonlift_compiler::{CompilerOptions, compile_package};
//! use moonlift_core::{Bump, ProgramBuilder};
//! use moonlift_registry::ArchiveRegistry;
//!
//! let arena = Bump::new();
//! let mut b = ProgramBuilder::new(&arena, "hello", "hello");
//! let sig = b.signature(&[], &[], false);
//! let main = b.func("Main", sig);
//! let body = b.block(&[]);
//! let decl = b.func_decl(main, Some(body));
//! let (package, info) = b.finish(&[], &[decl]);
//!
//! let registry = ArchiveRegistry::new();
//! let options = CompilerOptions::default();
//! let compiled = compile_package(&package, &info, &options, &registry).unwrap();
//! assert!(compiled.archive.code.contains("Main = function()"));
//! assert_eq!(compiled.archive.export("Main"), Some("Main"));
//! ```

pub mod analysis;
pub mod context;
pub mod emit;
mod expr;
pub mod flow;
pub mod function;
pub mod machine;
pub mod methods;
pub mod naming;
pub mod options;
pub mod package;
mod stmt;
pub mod typedesc;

pub use context::{FuncContext, PackageContext};
pub use emit::CodeWriter;
pub use expr::find_selection;
pub use function::{FunctionTranslator, TranslatedFunction, translate_decl};
pub use machine::{
    Case, CaseTarget, ENTRY_CASE, Exit, Fiber, FiberStatus, MachineError, StateMachine,
    Suspension, TERMINAL_CASE, Transfer, Transition,
};
pub use methods::{ReceiverShape, TranslatedMethod, translate_method};
pub use naming::NameTable;
pub use options::CompilerOptions;
pub use package::{CompiledPackage, FunctionChunk, compile_package};
pub use typedesc::{NamedTypeDecl, TypeDescriptors};
