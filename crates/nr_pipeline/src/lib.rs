pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{Pipeline, RunSummary, DEFAULT_MAX_CONCURRENT};
pub use scheduler::{Scheduler, TickOutcome};

pub mod prelude {
    pub use super::{Pipeline, RunSummary, Scheduler, TickOutcome};
    pub use nr_core::{Error, Result};
}
