pub mod local;
pub mod tcp;

pub use local::{LocalReport, partition_inputs, run_local};
pub use tcp::{CoordinatorNode, run_worker_node};
