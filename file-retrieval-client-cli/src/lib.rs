#![warn(missing_docs)]
//! Command line client retrieving a named file from a server served out of a local
//! directory tree.

mod command_context;
pub mod commands;
pub mod configuration;

pub use command_context::*;
