use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, anyhow};
use slog::{Logger, debug};

use crate::logging::LoggerExtensions;
use crate::{ServerConnection, StdResult, TransportError, TransportResult};

/// A [ServerConnection] serving the files of a local directory tree.
///
/// Each sub-directory of the servers directory is a server, identified by the directory name,
/// and serves the files it contains. A file is streamed in chunks of at most `chunk_size`
/// bytes, cut on character boundaries.
#[derive(Debug)]
pub struct DirectoryServerConnection {
    servers_directory: PathBuf,
    chunk_size: usize,
    session: Mutex<Option<Session>>,
    logger: Logger,
}

#[derive(Debug)]
struct Session {
    server_directory: PathBuf,
    transfer: Option<Transfer>,
}

#[derive(Debug)]
struct Transfer {
    contents: String,
    position: usize,
}

impl Transfer {
    fn has_remaining(&self) -> bool {
        self.position < self.contents.len()
    }

    fn next_chunk(&mut self, chunk_size: usize) -> Option<String> {
        let remaining = &self.contents[self.position..];
        if remaining.is_empty() {
            return None;
        }

        let mut end = chunk_size.min(remaining.len());
        while end > 0 && !remaining.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // The first character alone is larger than a chunk
            end = remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(index, _)| index);
        }

        let chunk = remaining[..end].to_string();
        self.position += end;

        Some(chunk)
    }
}

impl DirectoryServerConnection {
    /// Create a new instance serving the sub-directories of `servers_directory`.
    pub fn new(servers_directory: PathBuf, chunk_size: usize, logger: Logger) -> StdResult<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("Chunk size must be greater than zero"));
        }

        Ok(Self {
            servers_directory,
            chunk_size,
            session: Mutex::new(None),
            logger: logger.new_with_component_name::<Self>(),
        })
    }

    fn lock_session(&self) -> TransportResult<MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|e| TransportError::InvalidState(format!("session lock poisoned: {e}")))
    }

    fn with_open_session<T>(
        &self,
        operation: impl FnOnce(&mut Session) -> TransportResult<T>,
    ) -> TransportResult<T> {
        let mut session = self.lock_session()?;
        let session = session
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("no open connection".to_string()))?;

        operation(session)
    }

    fn with_transfer<T>(&self, operation: impl FnOnce(&mut Transfer) -> T) -> TransportResult<T> {
        self.with_open_session(|session| {
            let transfer = session.transfer.as_mut().ok_or_else(|| {
                TransportError::InvalidState("no file requested on this connection".to_string())
            })?;

            Ok(operation(transfer))
        })
    }
}

/// Check that the given path is relative and only made of plain names, so it can not escape the
/// directory it is joined to.
fn is_plain_relative_path(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some()
        && components.all(|component| matches!(component, Component::Normal(_)))
}

fn is_plain_name(name: &str) -> bool {
    let path = Path::new(name);
    is_plain_relative_path(path) && path.components().count() == 1
}

/// Resolve the symbolic links of `path` and check that the result is still inside `root`.
///
/// Returns `None` if the path does not exist or resolves outside of `root`.
fn resolve_inside(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let resolved = path.canonicalize().ok()?;

    resolved.starts_with(&root).then_some(resolved)
}

impl ServerConnection for DirectoryServerConnection {
    fn connect_to(&self, server_id: &str) -> TransportResult<bool> {
        let mut session = self.lock_session()?;
        if session.is_some() {
            return Err(TransportError::InvalidState(
                "a connection is already open".to_string(),
            ));
        }

        let server_directory = is_plain_name(server_id)
            .then(|| {
                resolve_inside(
                    &self.servers_directory,
                    &self.servers_directory.join(server_id),
                )
            })
            .flatten()
            .filter(|directory| directory.is_dir());
        let Some(server_directory) = server_directory else {
            debug!(self.logger, "Unknown server"; "server_id" => server_id);
            return Ok(false);
        };

        debug!(
            self.logger, "Connected";
            "server_id" => server_id, "server_directory" => %server_directory.display()
        );
        *session = Some(Session {
            server_directory,
            transfer: None,
        });

        Ok(true)
    }

    fn request_file_contents(&self, file_name: &str) -> TransportResult<bool> {
        self.with_open_session(|session| {
            let file_path = is_plain_relative_path(Path::new(file_name))
                .then(|| {
                    resolve_inside(
                        &session.server_directory,
                        &session.server_directory.join(file_name),
                    )
                })
                .flatten()
                .filter(|path| path.is_file());
            let Some(file_path) = file_path else {
                debug!(self.logger, "Unknown file"; "file_name" => file_name);
                session.transfer = None;
                return Ok(false);
            };

            let bytes = fs::read(&file_path)
                .with_context(|| format!("Could not read file '{}'", file_path.display()))
                .map_err(TransportError::Failure)?;
            let contents = String::from_utf8(bytes)
                .with_context(|| format!("File '{}' is not valid UTF-8", file_path.display()))
                .map_err(TransportError::Failure)?;

            debug!(
                self.logger, "File ready to be read";
                "file_name" => file_name, "size" => contents.len()
            );
            session.transfer = Some(Transfer {
                contents,
                position: 0,
            });

            Ok(true)
        })
    }

    fn more_bytes(&self) -> TransportResult<bool> {
        self.with_transfer(|transfer| transfer.has_remaining())
    }

    fn read(&self) -> TransportResult<Option<String>> {
        self.with_transfer(|transfer| transfer.next_chunk(self.chunk_size))
    }

    fn close_connection(&self) -> TransportResult<()> {
        let mut session = self.lock_session()?;
        match session.take() {
            Some(closed_session) => {
                debug!(
                    self.logger, "Connection closed";
                    "server_directory" => %closed_session.server_directory.display()
                );
                Ok(())
            }
            None => Err(TransportError::InvalidState(
                "no open connection to close".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_tools::{TempDir, TestLogger};

    use super::*;

    /// Create a servers directory holding one server, `server-1`, serving the given files.
    fn setup_servers_directory(test_name: &str, files: &[(&str, &str)]) -> PathBuf {
        let servers_directory = TempDir::create("directory_connection", test_name);
        let server_directory = servers_directory.join("server-1");
        fs::create_dir_all(&server_directory).unwrap();
        for (file_name, contents) in files {
            let file_path = server_directory.join(file_name);
            fs::create_dir_all(file_path.parent().unwrap()).unwrap();
            fs::write(file_path, contents).unwrap();
        }

        servers_directory
    }

    fn build_connection(
        servers_directory: PathBuf,
        chunk_size: usize,
    ) -> DirectoryServerConnection {
        DirectoryServerConnection::new(servers_directory, chunk_size, TestLogger::stdout())
            .unwrap()
    }

    fn read_all_chunks(connection: &DirectoryServerConnection) -> Vec<String> {
        let mut chunks = vec![];
        while connection.more_bytes().unwrap() {
            chunks.push(connection.read().unwrap().unwrap());
        }
        chunks
    }

    #[test]
    fn creating_a_connection_with_a_zero_chunk_size_fails() {
        DirectoryServerConnection::new(PathBuf::from("whatever"), 0, TestLogger::stdout())
            .expect_err("a zero chunk size should be rejected");
    }

    #[test]
    fn connect_to_an_existing_server() {
        let servers_directory = setup_servers_directory("connect_to_an_existing_server", &[]);
        let connection = build_connection(servers_directory, 16);

        assert!(connection.connect_to("server-1").unwrap());
    }

    #[test]
    fn connect_to_an_unknown_server_is_refused() {
        let servers_directory =
            setup_servers_directory("connect_to_an_unknown_server_is_refused", &[]);
        let connection = build_connection(servers_directory, 16);

        assert!(!connection.connect_to("unknown-server").unwrap());
        connection
            .close_connection()
            .expect_err("nothing should be open after a refused connection");
    }

    #[test]
    fn connect_to_a_server_id_that_is_not_a_plain_name_is_refused() {
        let servers_directory = setup_servers_directory(
            "connect_to_a_server_id_that_is_not_a_plain_name_is_refused",
            &[],
        );
        let connection = build_connection(servers_directory, 16);

        for server_id in ["", ".", "..", "../server-1", "server-1/.."] {
            assert!(
                !connection.connect_to(server_id).unwrap(),
                "connection to '{server_id}' should be refused"
            );
        }
    }

    #[test]
    fn connect_twice_without_closing_fails() {
        let servers_directory = setup_servers_directory("connect_twice_without_closing_fails", &[]);
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        connection
            .connect_to("server-1")
            .expect_err("a second connection should not be allowed while one is open");
    }

    #[test]
    fn operations_without_an_open_connection_fail() {
        let servers_directory =
            setup_servers_directory("operations_without_an_open_connection_fail", &[]);
        let connection = build_connection(servers_directory, 16);

        connection.request_file_contents("file.txt").unwrap_err();
        connection.more_bytes().unwrap_err();
        connection.read().unwrap_err();
        connection.close_connection().unwrap_err();
    }

    #[test]
    fn reading_before_requesting_a_file_fails() {
        let servers_directory =
            setup_servers_directory("reading_before_requesting_a_file_fails", &[]);
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        connection.more_bytes().unwrap_err();
        connection.read().unwrap_err();
    }

    #[test]
    fn request_an_existing_file() {
        let servers_directory =
            setup_servers_directory("request_an_existing_file", &[("file.txt", "content")]);
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        assert!(connection.request_file_contents("file.txt").unwrap());
    }

    #[test]
    fn request_a_file_in_a_sub_directory() {
        let servers_directory = setup_servers_directory(
            "request_a_file_in_a_sub_directory",
            &[("nested/file.txt", "nested content")],
        );
        let connection = build_connection(servers_directory, 64);
        connection.connect_to("server-1").unwrap();

        assert!(connection.request_file_contents("nested/file.txt").unwrap());
        assert_eq!(vec!["nested content".to_string()], read_all_chunks(&connection));
    }

    #[test]
    fn request_an_unknown_or_escaping_file_is_refused() {
        let servers_directory = setup_servers_directory(
            "request_an_unknown_or_escaping_file_is_refused",
            &[("file.txt", "content")],
        );
        fs::write(servers_directory.join("outside.txt"), "outside").unwrap();
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        for file_name in ["unknown.txt", "", "../outside.txt", "./file.txt", "/etc/hostname"] {
            assert!(
                !connection.request_file_contents(file_name).unwrap(),
                "file '{file_name}' should be refused"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn request_a_link_leading_outside_the_server_directory_is_refused() {
        let servers_directory = setup_servers_directory(
            "request_a_link_leading_outside_the_server_directory_is_refused",
            &[("file.txt", "content")],
        );
        let server_directory = servers_directory.join("server-1");
        fs::write(servers_directory.join("secret.txt"), "outside secret").unwrap();
        std::os::unix::fs::symlink("../secret.txt", server_directory.join("link.txt")).unwrap();
        std::os::unix::fs::symlink("file.txt", server_directory.join("inner_link.txt")).unwrap();
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        assert!(!connection.request_file_contents("link.txt").unwrap());
        connection.more_bytes().unwrap_err();
        assert!(connection.request_file_contents("inner_link.txt").unwrap());
        assert_eq!(vec!["content".to_string()], read_all_chunks(&connection));
    }

    #[cfg(unix)]
    #[test]
    fn connect_to_a_server_linked_outside_the_servers_directory_is_refused() {
        let servers_directory = setup_servers_directory(
            "connect_to_a_server_linked_outside_the_servers_directory_is_refused",
            &[],
        );
        let outside_directory = TempDir::create(
            "directory_connection",
            "connect_to_a_server_linked_outside_the_servers_directory_target",
        );
        std::os::unix::fs::symlink(&outside_directory, servers_directory.join("linked-server"))
            .unwrap();
        let connection = build_connection(servers_directory, 16);

        assert!(!connection.connect_to("linked-server").unwrap());
        connection.close_connection().unwrap_err();
    }

    #[test]
    fn request_a_directory_is_refused() {
        let servers_directory = setup_servers_directory(
            "request_a_directory_is_refused",
            &[("nested/file.txt", "content")],
        );
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        assert!(!connection.request_file_contents("nested").unwrap());
    }

    #[test]
    fn request_a_file_that_is_not_utf8_fails() {
        let servers_directory =
            setup_servers_directory("request_a_file_that_is_not_utf8_fails", &[]);
        fs::write(
            servers_directory.join("server-1").join("binary.bin"),
            b"\xff\xfe\x00",
        )
        .unwrap();
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();

        let error = connection
            .request_file_contents("binary.bin")
            .expect_err("a non UTF-8 file should not be served");

        assert!(
            matches!(error, TransportError::Failure(_)),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn empty_file_has_no_bytes() {
        let servers_directory =
            setup_servers_directory("empty_file_has_no_bytes", &[("empty", "")]);
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();
        connection.request_file_contents("empty").unwrap();

        assert!(!connection.more_bytes().unwrap());
        assert_eq!(None, connection.read().unwrap());
    }

    #[test]
    fn file_is_read_in_chunks_of_the_configured_size() {
        let servers_directory = setup_servers_directory(
            "file_is_read_in_chunks_of_the_configured_size",
            &[("file.txt", "0123456789abc")],
        );
        let connection = build_connection(servers_directory, 5);
        connection.connect_to("server-1").unwrap();
        connection.request_file_contents("file.txt").unwrap();

        assert_eq!(
            vec!["01234".to_string(), "56789".to_string(), "abc".to_string()],
            read_all_chunks(&connection)
        );
        assert_eq!(None, connection.read().unwrap());
    }

    #[test]
    fn chunks_are_cut_on_character_boundaries() {
        // 'é' is two bytes long, '€' three
        let servers_directory = setup_servers_directory(
            "chunks_are_cut_on_character_boundaries",
            &[("file.txt", "aé€b")],
        );
        let connection = build_connection(servers_directory, 2);
        connection.connect_to("server-1").unwrap();
        connection.request_file_contents("file.txt").unwrap();

        assert_eq!(
            vec![
                "a".to_string(),
                "é".to_string(),
                "€".to_string(),
                "b".to_string()
            ],
            read_all_chunks(&connection)
        );
    }

    #[test]
    fn close_ends_the_session_and_allows_a_new_connection() {
        let servers_directory = setup_servers_directory(
            "close_ends_the_session_and_allows_a_new_connection",
            &[("file.txt", "content")],
        );
        let connection = build_connection(servers_directory, 16);
        connection.connect_to("server-1").unwrap();
        connection.request_file_contents("file.txt").unwrap();

        connection.close_connection().unwrap();

        connection.more_bytes().unwrap_err();
        connection.close_connection().unwrap_err();
        assert!(connection.connect_to("server-1").unwrap());
    }

    mod transfer {
        use super::*;

        fn transfer(contents: &str) -> Transfer {
            Transfer {
                contents: contents.to_string(),
                position: 0,
            }
        }

        #[test]
        fn chunk_size_larger_than_contents_yields_a_single_chunk() {
            let mut transfer = transfer("content");

            assert_eq!(Some("content".to_string()), transfer.next_chunk(1024));
            assert!(!transfer.has_remaining());
            assert_eq!(None, transfer.next_chunk(1024));
        }

        #[test]
        fn chunk_smaller_than_a_character_holds_the_whole_character() {
            let mut transfer = transfer("€€");

            assert_eq!(Some("€".to_string()), transfer.next_chunk(1));
            assert_eq!(Some("€".to_string()), transfer.next_chunk(1));
            assert_eq!(None, transfer.next_chunk(1));
        }

        #[test]
        fn chunk_stops_before_a_character_overflowing_it() {
            let mut transfer = transfer("ab€");

            assert_eq!(Some("ab".to_string()), transfer.next_chunk(4));
            assert_eq!(Some("€".to_string()), transfer.next_chunk(4));
        }
    }
}
