//! Compilation sessions.
//!
//! A [`Session`] compiles packages one at a time, dependencies first, and
//! keeps every archive it produced so later packages can import it.
//!
//! # Example
//!
//! ```
//! use moonlift::{Bump, ProgramBuilder, Session};
//!
//! let arena = Bump::new();
//! let mut b = ProgramBuilder::new(&arena, "example.com/greet", "greet");
//! let sig = b.signature(&[], &[], false);
//! let hello = b.func("Hello", sig);
//! let body = b.block(&[]);
//! let decl = b.func_decl(hello, Some(body));
//! let (package, info) = b.finish(&[], &[decl]);
//!
//! let mut session = Session::new();
//! let compiled = session.compile(&package, &info).unwrap();
//! assert!(compiled.diagnostics.is_empty());
//! assert!(session.archive("example.com/greet").is_some());
//! ```

use rustc_hash::FxHashMap;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

use moonlift_compiler::{CompiledPackage, CompilerOptions, compile_package};
use moonlift_core::ast::Package;
use moonlift_core::{CompilationError, Result, SemanticInfo};
use moonlift_registry::{Archive, ArchiveRegistry};

/// Compiles packages against the archives of earlier compilations.
#[derive(Debug, Default)]
pub struct Session {
    options: CompilerOptions,
    registry: ArchiveRegistry,
    /// Hash of each archive's generated code, for change detection.
    fingerprints: FxHashMap<String, u64>,
}

impl Session {
    /// A session with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn registry(&self) -> &ArchiveRegistry {
        &self.registry
    }

    /// The archive compiled for `path`, if any.
    pub fn archive(&self, path: &str) -> Option<&Archive> {
        self.registry.get(path)
    }

    /// xxh64 of the code last generated for `path`.
    pub fn fingerprint(&self, path: &str) -> Option<u64> {
        self.fingerprints.get(path).copied()
    }

    /// Compile `package` and register its archive.
    ///
    /// Every package it imports must have been compiled by this session
    /// first. Recompiling a package replaces its archive.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile(&mut self, package: &Package<'_>, info: &SemanticInfo) -> Result<CompiledPackage> {
        let compiled = compile_package(package, info, &self.options, &self.registry)?;
        let fingerprint = xxh64(compiled.archive.code.as_bytes(), 0);
        let changed = self.fingerprint(package.path) != Some(fingerprint);
        self.registry
            .register(compiled.archive.clone())
            .map_err(CompilationError::from)?;
        self.fingerprints.insert(package.path.to_string(), fingerprint);
        if !compiled.diagnostics.is_empty() {
            info!(
                package = %package.path,
                diagnostics = compiled.diagnostics.len(),
                "compiled with skipped functions"
            );
        }
        debug!(package = %package.path, changed, "package registered");
        Ok(compiled)
    }

    /// Archives in an order where each follows everything it imports.
    ///
    /// Fails when an import was never compiled.
    pub fn load_order(&self) -> Result<Vec<&Archive>> {
        if let Some(missing) = self.registry.missing_import() {
            return Err(missing.into());
        }
        self.registry.build_order().map_err(CompilationError::from)
    }
}
