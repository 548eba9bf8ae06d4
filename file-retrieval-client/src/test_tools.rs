//! Tools to write tests involving the file retrieval client.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use slog::{Drain, Logger};
use slog_async::Async;
use slog_term::{CompactFormat, PlainDecorator};

/// Builder of loggers for tests.
pub struct TestLogger;

impl TestLogger {
    fn from_writer<W: io::Write + Send + 'static>(writer: W) -> Logger {
        let decorator = PlainDecorator::new(writer);
        let drain = CompactFormat::new(decorator).build().fuse();
        let drain = Async::new(drain).build().fuse();
        Logger::root(Arc::new(drain), slog::o!())
    }

    /// Logger writing to the standard output, captured by the test harness.
    pub fn stdout() -> Logger {
        Self::from_writer(slog_term::TestStdoutWriter)
    }

    /// Logger writing to the given file, the logs are flushed when the logger is dropped.
    pub fn file(filepath: &Path) -> Logger {
        let file = File::create(filepath)
            .unwrap_or_else(|e| panic!("Could not create log file {filepath:?}: {e}"));
        Self::from_writer(file)
    }
}

const TEMP_DIR_ROOT_NAME: &str = "file_retrieval_client_test";

/// Temporary directories for tests.
pub struct TempDir;

impl TempDir {
    /// Path of the temporary directory of the given module and test name, no IO is done.
    pub fn path<T: AsRef<str>>(module: T, name: T) -> PathBuf {
        std::env::temp_dir()
            .join(TEMP_DIR_ROOT_NAME)
            .join(module.as_ref())
            .join(name.as_ref())
    }

    /// Create an empty temporary directory for the given module and test name.
    ///
    /// If the directory already exists it is removed first.
    pub fn create<T: AsRef<str>>(module: T, name: T) -> PathBuf {
        let path = Self::path(module, name);
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .unwrap_or_else(|e| panic!("Could not remove dir {path:?}: {e}"));
        }
        std::fs::create_dir_all(&path)
            .unwrap_or_else(|e| panic!("Could not create dir {path:?}: {e}"));

        path
    }
}
