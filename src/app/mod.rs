// Application layer - job registry and use cases built on it

pub mod batch;
pub mod container;
pub mod jobs;

pub use batch::{collect_inputs, run_batch, BatchOutcome, BatchSummary};
pub use container::AppContainer;
pub use jobs::{JobHandle, JobRegistry, JobSummary};
