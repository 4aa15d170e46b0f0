//! moonlift compiles packages written with blocking, goroutine-style
//! concurrency into Lua for hosts that only offer single-threaded execution
//! and a resumable fiber primitive.
//!
//! The work is split across three crates, re-exported here:
//!
//! - [`moonlift_core`]: the typed AST and semantic facts an external type
//!   checker delivers, plus [`ProgramBuilder`] to construct them
//! - [`moonlift_registry`]: compiled [`Archive`]s and the importer protocol
//! - [`moonlift_compiler`]: the translator itself
//!
//! [`Session`] ties them together for multi-package builds.

mod session;

pub use session::Session;

pub use moonlift_compiler::{
    CompiledPackage, CompilerOptions, Fiber, FiberStatus, FunctionChunk, MachineError,
    StateMachine, compile_package,
};
pub use moonlift_core::{
    Bump, CompilationError, Diagnostics, ProgramBuilder, Result, SemanticInfo,
};
pub use moonlift_registry::{Archive, ArchiveRegistry, ImportError, MethodEntry, ReceiverForm};

pub use moonlift_compiler as compiler;
pub use moonlift_core as core;
pub use moonlift_registry as registry;
