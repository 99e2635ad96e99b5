pub mod flow_file_factory;
pub mod flow_record_factory;
pub mod query_spec_factory;

pub use flow_file_factory::FlowFileFactory;
pub use flow_record_factory::FlowRecordFactory;
pub use query_spec_factory::QuerySpecFactory;

#[cfg(test)]
mod flow_file_factory_test;
#[cfg(test)]
mod flow_record_factory_test;
#[cfg(test)]
mod query_spec_factory_test;
