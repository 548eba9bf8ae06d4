//! Commands for the file retrieval client CLI.

mod fetch;

pub use fetch::*;

/// Default size, in bytes, of the chunks read from a server.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
