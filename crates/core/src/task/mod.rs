//! Stage tasks: the boundary to the per-stage processing logic.
//!
//! A [`StageTask`] turns a document into a stage payload. The
//! [`TaskRegistry`] maps each stage to its task, and the [`TaskRunner`]
//! invokes tasks, timing them and turning panics into faults.

mod registry;
mod runner;
mod traits;

pub use registry::{RegistryError, TaskRegistry};
pub use runner::{TaskOutcome, TaskRun, TaskRunner};
pub use traits::{StageTask, TaskError, TaskResult};
