pub mod errors;
pub mod file;
pub mod filter;
pub mod record;
pub mod table;
pub mod types;

pub use errors::EngineError;
pub use record::FlowRecord;
