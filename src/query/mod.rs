pub mod buffer;
pub mod context;
pub mod coordinator;
pub mod errors;
pub mod progress;
pub mod query_spec;
pub mod stats;
pub mod stream;
pub mod tput;
pub mod worker;

pub use context::RuntimeContext;
pub use coordinator::{QueryReport, run_coordinator};
pub use errors::{ErrorKind, QueryError};
pub use query_spec::{QuerySpec, TimeWindow, WorkingMode};
pub use worker::{WorkerInput, WorkerReport, run_worker};

#[cfg(test)]
mod progress_test;
#[cfg(test)]
mod stream_test;
