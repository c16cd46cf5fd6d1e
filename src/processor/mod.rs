// src/processor/mod.rs

//! Declarative processor specifications.
//!
//! - [`spec`]: raw TOML model, validated definition, and the two processor
//!   variants behind the [`ProcessorSpec`] trait.
//! - [`selection`]: `all` / `first` / `last` / `nth(k)` policies.
//! - [`validate`]: raw → validated conversion.
//! - [`loader`]: per-file loading of a processor library directory.

pub mod loader;
pub mod selection;
pub mod spec;
pub mod validate;

pub use loader::{load_library, load_processor, parse_processor, ProcessorLibrary};
pub use selection::SelectionPolicy;
pub use spec::{
    FilterTerm, InputSlot, Iteration, MatchFilter, Processor, ProcessorSpec, RawProcessorSpec,
    Requirements, ResourceFilter, SessionProcessor, SpecDefinition, SubjectProcessor,
};
pub use validate::derive_proctype;
