//! Decision-cycle orchestration: scheduling, reconciliation, execution and
//! outcome recording against the injected collaborators.

pub mod analysis;
pub mod deadline;
pub mod executor;
pub mod learning;
pub mod orchestrator;
pub mod reconcile;
pub mod recorder;

pub use analysis::PerformanceAnalyzer;
pub use deadline::{Deadline, DeadlineElapsed};
pub use executor::ExecutionError;
pub use learning::{run_learning_pass, spawn_learning_pass, LearningError};
pub use orchestrator::{OrchestrationError, Orchestrator, TickOutcome, TraderStatus};
pub use recorder::{ClosedPosition, OutcomeRecorder};
