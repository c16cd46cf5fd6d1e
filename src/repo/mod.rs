// src/repo/mod.rs

//! Artefact model and the repository the engine reads scans from.

pub mod artefact;
pub mod repository;

pub use artefact::{Artefact, ArtefactId, ArtefactPool, UpstreamStatus};
pub use repository::{ArtefactRepository, MemoryRepository};
