//! Storage for compiled archives.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::archive::Archive;
use crate::graph::DependencyGraph;
use crate::importer::{ArchiveSource, ImportError, UNSAFE_PATH};

/// Every archive compiled so far, keyed by import path.
#[derive(Debug, Default)]
pub struct ArchiveRegistry {
    archives: FxHashMap<String, Archive>,
    graph: DependencyGraph,
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive, replacing any earlier one for the same path.
    ///
    /// Fails when the new import edges close a cycle.
    pub fn register(&mut self, archive: Archive) -> Result<(), ImportError> {
        debug!(
            path = %archive.import_path,
            exports = archive.exports.len(),
            "registering archive"
        );
        let mut graph = self.graph.clone();
        graph.add_package(&archive.import_path, &archive.imports);
        if graph.has_cycle() {
            return Err(ImportError::Cycle {
                path: archive.import_path,
            });
        }
        self.graph = graph;
        self.archives.insert(archive.import_path.clone(), archive);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Archive> {
        self.archives.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.archives.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Registered archives in dependency order.
    pub fn build_order(&self) -> Result<Vec<&Archive>, ImportError> {
        Ok(self
            .graph
            .build_order()?
            .iter()
            .filter_map(|path| self.archives.get(path))
            .collect())
    }

    /// The first import of any registered archive that is not registered.
    pub fn missing_import(&self) -> Option<ImportError> {
        let mut paths: Vec<_> = self.archives.keys().collect();
        paths.sort();
        paths.into_iter().find_map(|path| {
            self.archives[path]
                .imports
                .iter()
                .find(|import| import.as_str() != UNSAFE_PATH && !self.contains(import))
                .map(|import| ImportError::NotFound {
                    path: import.clone(),
                })
        })
    }
}

impl ArchiveSource for ArchiveRegistry {
    fn lookup(&self, path: &str) -> Option<&Archive> {
        self.get(path)
    }
}
