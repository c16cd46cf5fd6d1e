// src/dag/mod.rs

//! Processor dependency ordering.
//!
//! - [`graph`] holds the proctype graph derived from assessor inputs.
//! - [`order`] computes a best-effort topological order (Kahn).
//! - [`cycles`] reports dependency cycles (Tarjan SCC), for diagnostics only.

pub mod cycles;
pub mod graph;
pub mod order;

pub use cycles::find_cycles;
pub use graph::{DependencyNode, ProcessorGraph};
pub use order::{order, ProcessorOrder};
