// src/task/mod.rs

//! Tasks: model, status axes, lifecycle, readiness, persistence and
//! reconciliation against matched parameter sets.

pub mod file_store;
pub mod lifecycle;
pub mod model;
pub mod readiness;
pub mod reconcile;
pub mod status;
pub mod store;

pub use file_store::FileTaskStore;
pub use lifecycle::{can_transition, restart_on_request};
pub use model::{Task, TaskKey};
pub use readiness::{evaluate_readiness, initial_statuses, SchedulingOutcome};
pub use reconcile::{reconcile, ReconcileDiff};
pub use status::{ProcStatus, QcStatus};
pub use store::{MemoryTaskStore, Outputs, TaskStore};
