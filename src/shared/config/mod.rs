pub mod model;

pub use model::{ClusterConfig, LoggingConfig, QueryConfig, Settings, load_settings, load_settings_from};

#[cfg(test)]
mod model_test;
