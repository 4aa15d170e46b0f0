//! Compiled package archives and the importer protocol.
//!
//! A translated package becomes an [`Archive`]: its generated code plus the
//! tables later packages need to import it. [`ArchiveRegistry`] stores
//! archives and orders them by their import graph; [`ImportContext`] is the
//! per-unit view the translator resolves imports through.

pub mod archive;
pub mod graph;
pub mod importer;
pub mod registry;

pub use archive::{Archive, MethodEntry, ReceiverForm};
pub use graph::DependencyGraph;
pub use importer::{ArchiveSource, ImportContext, ImportError, UNSAFE_PATH};
pub use registry::ArchiveRegistry;
