//! IPC hub: a Unix-domain socket at `<root>/ipc-<pid>.sock` serving tool
//! servers.
//!
//! Each connection carries one request object and one response object: the
//! client writes its JSON, shuts down its write half, reads the reply, and
//! the connection closes. The accept loop stays single-tasked; every
//! accepted connection is serviced on its own task, and handler panics are
//! contained at that task boundary instead of taking the hub down.
//!
//! No authentication happens here: any process that can open the socket is
//! trusted to the level of the orchestrator. The intended callers are the
//! tool-server subprocesses, which receive the socket path in their
//! environment.

mod handlers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use handlers::Handlers;

use ipc_proto::{parse_request, IpcResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("ipc socket: {0}")]
    Io(#[from] std::io::Error),
}

/// Socket path for this orchestrator process.
pub fn socket_path(root: &Path) -> PathBuf {
    root.join(format!("ipc-{}.sock", std::process::id()))
}

/// Removes sockets left behind by prior orchestrator processes (any file
/// matching `ipc-*.sock` under the root). Returns how many were removed.
pub fn remove_stale_sockets(root: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("ipc-") && name.ends_with(".sock") {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub struct IpcHub {
    socket_path: PathBuf,
    cancel: CancellationToken,
}

impl IpcHub {
    /// Binds the socket and starts the accept loop. Stale sockets from
    /// prior PIDs are cleaned up first.
    pub fn start(
        root: &Path,
        handlers: Arc<Handlers>,
        cancel: CancellationToken,
    ) -> Result<Self, IpcError> {
        remove_stale_sockets(root)?;
        let path = socket_path(root);
        Self::bind(path, handlers, cancel)
    }

    /// Binds an explicit socket path (tests bind into a tempdir).
    pub fn bind(
        socket_path: PathBuf,
        handlers: Arc<Handlers>,
        cancel: CancellationToken,
    ) -> Result<Self, IpcError> {
        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!(path = %socket_path.display(), "ipc hub listening");

        let accept_token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_token.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let handlers = Arc::clone(&handlers);
                                tokio::spawn(handle_connection(stream, handlers));
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "ipc accept failed");
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            socket_path,
            cancel,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stops the accept loop and unlinks the socket file.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "socket unlink failed");
            }
        }
    }
}

impl Drop for IpcHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(mut stream: UnixStream, handlers: Arc<Handlers>) {
    let mut raw = String::new();
    let (mut reader, mut writer) = stream.split();
    if let Err(e) = reader.read_to_string(&mut raw).await {
        tracing::warn!(error = %e, "ipc read failed");
        return;
    }

    let response = match parse_request(&raw) {
        Ok(request) => {
            // A panicking handler surfaces as a task join error, which the
            // hub turns into an error envelope instead of dying.
            let task = tokio::spawn(async move { handlers.dispatch(request).await });
            match task.await {
                Ok(response) => response,
                Err(e) if e.is_panic() => {
                    tracing::error!("ipc handler panicked");
                    IpcResponse::error("internal error")
                }
                Err(e) => IpcResponse::error(format!("handler aborted: {}", e)),
            }
        }
        Err(e) => IpcResponse::error(e.to_string()),
    };

    if let Err(e) = writer.write_all(response.to_json().as_bytes()).await {
        tracing::warn!(error = %e, "ipc write failed");
        return;
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_sockets_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ipc-123.sock"), "").unwrap();
        std::fs::write(dir.path().join("ipc-456.sock"), "").unwrap();
        std::fs::write(dir.path().join("orchestrator.db"), "").unwrap();

        let removed = remove_stale_sockets(dir.path()).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("orchestrator.db").exists());
    }

    #[test]
    fn socket_path_carries_pid() {
        let path = socket_path(Path::new("/data"));
        assert_eq!(
            path,
            Path::new(&format!("/data/ipc-{}.sock", std::process::id()))
        );
    }
}
