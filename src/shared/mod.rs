pub mod config;
pub mod output;
pub mod path;
pub mod storage_header;

#[cfg(test)]
mod storage_header_tests;
