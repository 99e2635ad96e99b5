pub mod args;
pub mod parse;

pub use args::{Cli, QueryArgs, Role};

#[cfg(test)]
mod args_test;
