//! Command-line adapter for arkgate.

pub mod parser;

pub use parser::Cli;
