//! Storage port over an SSH/SFTP session.

use crate::config::SftpConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use stash_core::{
    ByteStream, Error, Hierarchy, NodeKind, Result, Storage, StorageEntry, create_ancestors, pipe,
};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

/// `SSH_FX_NO_SUCH_FILE`.
const FX_NO_SUCH_FILE: i32 = 2;

/// Mode applied to directories created on the server.
const DIR_MODE: i32 = 0o700;

/// An authenticated session with its SFTP channel.
struct Connection {
    session: Session,
    sftp: Sftp,
}

impl Connection {
    fn open(config: &SftpConfig) -> Result<Self> {
        let address = config.address();
        let timeout = config.connect_timeout();

        let socket = address
            .to_socket_addrs()
            .map_err(|e| Error::Backend(format!("Failed to resolve {}: {}", address, e)))?
            .next()
            .ok_or_else(|| Error::Backend(format!("No address found for {}", address)))?;
        let tcp = TcpStream::connect_timeout(&socket, timeout)
            .map_err(|e| Error::Backend(format!("Failed to connect to {}: {}", address, e)))?;

        let mut session =
            Session::new().map_err(|e| Error::Backend(format!("Failed to create session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| Error::Backend(format!("SSH handshake with {} failed: {}", address, e)))?;

        let auth = match (&config.private_key, &config.password) {
            (Some(key), _) => {
                session.userauth_pubkey_memory(&config.username, None, key, None)
            }
            (None, Some(password)) => session.userauth_password(&config.username, password),
            (None, None) => return Err(Error::Config("missing password or private key".into())),
        };
        auth.map_err(|e| {
            Error::Backend(format!("Authentication as {} failed: {}", config.username, e))
        })?;
        if !session.authenticated() {
            return Err(Error::Backend(format!(
                "Authentication as {} was rejected",
                config.username
            )));
        }

        // Transfers may stall far longer than the connect limit.
        session.set_timeout(0);
        let sftp = session
            .sftp()
            .map_err(|e| Error::Backend(format!("Failed to open SFTP channel: {}", e)))?;

        Ok(Self { session, sftp })
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        self.sftp
            .stat(Path::new(path))
            .map_err(|e| map_error("stat", path, e))
    }

    fn disconnect(self) {
        let Self { session, sftp } = self;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "closing cache session", None) {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}

impl Hierarchy for Connection {
    fn probe(&self, path: &str) -> Result<Option<NodeKind>> {
        match self.stat(path) {
            Ok(stat) if stat.is_dir() => Ok(Some(NodeKind::Directory)),
            Ok(_) => Ok(Some(NodeKind::File)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        self.sftp
            .mkdir(Path::new(path), DIR_MODE)
            .map_err(|e| map_error("mkdir", path, e))?;
        // The server applies its umask to mkdir; set the mode explicitly.
        let perm = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(DIR_MODE as u32),
            atime: None,
            mtime: None,
        };
        self.sftp
            .setstat(Path::new(path), perm)
            .map_err(|e| map_error("chmod", path, e))
    }
}

fn map_error(op: &str, path: &str, err: ssh2::Error) -> Error {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) => Error::NotFound(path.to_string()),
        _ => Error::Backend(format!("sftp {} failed for {}: {}", op, path, err)),
    }
}

fn entry(name: String, stat: &FileStat) -> StorageEntry {
    StorageEntry {
        name,
        size: stat.size.unwrap_or(0),
        modified: stat
            .mtime
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
        is_dir: stat.is_dir(),
    }
}

type Shared = Arc<Mutex<Option<Connection>>>;

fn lock(shared: &Shared) -> Result<MutexGuard<'_, Option<Connection>>> {
    shared
        .lock()
        .map_err(|_| Error::Internal("SFTP session lock poisoned".into()))
}

/// Run `f` against the live connection on the blocking pool.
async fn with_connection<T, F>(shared: &Shared, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || {
        let guard = lock(&shared)?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Backend("SFTP session is closed".into()))?;
        f(conn)
    })
    .await?
}

/// SFTP-backed storage.
///
/// libssh2 sessions are not safe for concurrent use, so every operation
/// holds the session for its whole duration, including streamed bodies.
pub struct SftpStorage {
    shared: Shared,
    address: String,
}

impl SftpStorage {
    /// Dial the server and authenticate.
    ///
    /// A private key takes precedence over a password.
    pub async fn connect(config: &SftpConfig) -> Result<Self> {
        config.validate()?;
        let address = config.address();
        let config = config.clone();
        let conn = tokio::task::spawn_blocking(move || Connection::open(&config)).await??;
        info!(server = %address, "Connected to SFTP server");

        Ok(Self {
            shared: Arc::new(Mutex::new(Some(conn))),
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Disconnect the session if it is still open.
fn shutdown(shared: &Shared, address: &str) -> Result<()> {
    let conn = lock(shared)?.take();
    if let Some(conn) = conn {
        conn.disconnect();
        debug!(server = %address, "SFTP session closed");
    }
    Ok(())
}

#[async_trait]
impl Storage for SftpStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>> {
        let root = prefix.to_string();
        with_connection(&self.shared, move |conn| {
            let stat = match conn.stat(&root) {
                Ok(stat) => stat,
                Err(Error::NotFound(_)) => return Ok(vec![]),
                Err(e) => return Err(e),
            };

            let mut entries = vec![entry(root.clone(), &stat)];
            let mut pending = vec![];
            if stat.is_dir() {
                pending.push(root);
            }

            while let Some(dir) = pending.pop() {
                let children = match conn.sftp.readdir(Path::new(&dir)) {
                    Ok(children) => children,
                    Err(e) => {
                        debug!(dir = %dir, error = %e, "Skipping unreadable directory");
                        continue;
                    }
                };
                for (path, stat) in children {
                    let name = path.to_string_lossy().into_owned();
                    if stat.is_dir() {
                        pending.push(name.clone());
                    }
                    entries.push(entry(name, &stat));
                }
            }

            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<ByteStream> {
        let object = path.to_string();
        let stat = {
            let object = object.clone();
            with_connection(&self.shared, move |conn| conn.stat(&object)).await?
        };
        if stat.is_dir() {
            return Err(Error::Backend(format!("{} is a directory", path)));
        }

        let (mut writer, reader) = pipe(stash_core::pipe::DEFAULT_CAPACITY);
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let copied = (|| -> std::io::Result<u64> {
                let guard = lock(&shared).map_err(std::io::Error::other)?;
                let conn = guard
                    .as_ref()
                    .ok_or_else(|| std::io::Error::other("SFTP session is closed"))?;
                let mut file = conn
                    .sftp
                    .open(Path::new(&object))
                    .map_err(std::io::Error::from)?;
                let n = std::io::copy(&mut file, &mut writer)?;
                writer.flush()?;
                Ok(n)
            })();

            match copied {
                Ok(bytes) => {
                    debug!(path = %object, bytes, "Downloaded object");
                    writer.close();
                }
                Err(e) => {
                    warn!(path = %object, error = %e, "Download failed");
                    writer.close_with_error(e);
                }
            }
        });

        Ok(Box::pin(reader))
    }

    async fn put(&self, path: &str, _ttl: Option<Duration>, src: ByteStream) -> Result<()> {
        // The server keeps files until removed; the TTL hint is dropped.
        let object = path.to_string();
        let mut body = SyncIoBridge::new(src);
        with_connection(&self.shared, move |conn| {
            create_ancestors(conn, &object)?;
            let mut file = conn
                .sftp
                .create(Path::new(&object))
                .map_err(|e| map_error("create", &object, e))?;
            let bytes = std::io::copy(&mut body, &mut file)
                .map_err(|e| Error::Backend(format!("Failed to upload {}: {}", object, e)))?;
            debug!(path = %object, bytes, "Uploaded object");
            Ok(())
        })
        .await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let object = path.to_string();
        with_connection(&self.shared, move |conn| {
            conn.stat(&object)?;
            conn.sftp
                .unlink(Path::new(&object))
                .map_err(|e| map_error("remove", &object, e))
        })
        .await
    }

    fn name(&self) -> &str {
        "sftp"
    }

    async fn close(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let address = self.address.clone();
        tokio::task::spawn_blocking(move || shutdown(&shared, &address)).await?
    }
}

impl Drop for SftpStorage {
    fn drop(&mut self) {
        if let Err(e) = shutdown(&self.shared, &self.address) {
            warn!(server = %self.address, error = %e, "Failed to close SFTP session");
        }
    }
}
