//! Command line entry for the out step
//!
//! The binary takes the destination directory as its one argument and the
//! request on stdin; [`Runner`] drives one run from a decoded request.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
