//! The importer protocol.
//!
//! An [`ImportContext`] resolves import paths against an [`ArchiveSource`]
//! while one package is being translated. The pseudo-package `unsafe` never
//! needs a lookup. Only the first failure is kept; later failures in the
//! same unit are dropped, so the reported error is always the earliest one.

use std::sync::LazyLock;

use moonlift_core::CompilationError;
use thiserror::Error;
use tracing::trace;

use crate::archive::Archive;

/// Import path that resolves without an archive lookup.
pub const UNSAFE_PATH: &str = "unsafe";

static UNSAFE_ARCHIVE: LazyLock<Archive> = LazyLock::new(|| Archive::new(UNSAFE_PATH, "unsafe"));

/// Errors raised while resolving imports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("package \"{path}\" has not been compiled")]
    NotFound { path: String },

    #[error("package \"{path}\" does not export \"{name}\"")]
    MissingExport { path: String, name: String },

    #[error("import cycle through \"{path}\"")]
    Cycle { path: String },
}

impl ImportError {
    pub fn path(&self) -> &str {
        match self {
            ImportError::NotFound { path }
            | ImportError::MissingExport { path, .. }
            | ImportError::Cycle { path } => path,
        }
    }
}

impl From<ImportError> for CompilationError {
    fn from(err: ImportError) -> Self {
        CompilationError::ImportFailure {
            path: err.path().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Something that holds previously compiled archives.
pub trait ArchiveSource {
    fn lookup(&self, path: &str) -> Option<&Archive>;
}

/// Import state for one compilation unit.
pub struct ImportContext<'a> {
    source: &'a dyn ArchiveSource,
    error: Option<ImportError>,
}

impl<'a> ImportContext<'a> {
    pub fn new(source: &'a dyn ArchiveSource) -> Self {
        Self { source, error: None }
    }

    /// Resolve an import path. On failure the error is recorded (if it is
    /// the first) and `None` is returned.
    pub fn import(&mut self, path: &str) -> Option<&'a Archive> {
        if path == UNSAFE_PATH {
            return Some(&*UNSAFE_ARCHIVE);
        }
        match self.source.lookup(path) {
            Some(archive) => {
                trace!(path, "resolved import");
                Some(archive)
            }
            None => {
                self.record(ImportError::NotFound {
                    path: path.to_string(),
                });
                None
            }
        }
    }

    /// Generated identifier of `name` in the package at `path`.
    pub fn resolve_export(&mut self, path: &str, name: &str) -> Option<&'a str> {
        if path == UNSAFE_PATH {
            return None;
        }
        let archive = self.import(path)?;
        match archive.export(name) {
            Some(generated) => Some(generated),
            None => {
                self.record(ImportError::MissingExport {
                    path: path.to_string(),
                    name: name.to_string(),
                });
                None
            }
        }
    }

    /// Keep `error` unless an earlier one is already recorded.
    pub fn record(&mut self, error: ImportError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn error(&self) -> Option<&ImportError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The first recorded failure as a compilation error.
    pub fn finish(self) -> Result<(), CompilationError> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
