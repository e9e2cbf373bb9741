use shared::ipc::{Command, IpcError, Response};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Timeout for socket operations (5 seconds)
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Default socket path of hishod.
/// Uses XDG runtime directory if available, falls back to /tmp/hishod.sock
pub fn default_socket_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("hishod.sock")
    } else {
        PathBuf::from("/tmp/hishod.sock")
    }
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: Option<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.unwrap_or_else(default_socket_path),
        }
    }

    pub async fn send_command(&self, cmd: Command) -> Result<Response, IpcError> {
        let connect = UnixStream::connect(&self.socket_path);
        let mut stream = match timeout(SOCKET_TIMEOUT, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Connection timeout: failed to connect to daemon at {} within {:?}",
                    self.socket_path.display(),
                    SOCKET_TIMEOUT
                );
                return Err(IpcError::Timeout);
            }
        };

        let command_json = serde_json::to_vec(&cmd)?;

        if timeout(SOCKET_TIMEOUT, stream.write_all(&command_json)).await.is_err() {
            warn!("Write timeout: failed to send command to daemon within {:?}", SOCKET_TIMEOUT);
            return Err(IpcError::Timeout);
        }

        let mut buffer = Vec::new();
        match timeout(SOCKET_TIMEOUT, stream.read_to_end(&mut buffer)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Read timeout: failed to receive response from daemon within {:?}",
                    SOCKET_TIMEOUT
                );
                return Err(IpcError::Timeout);
            }
        }

        let response: Response = serde_json::from_slice(&buffer)?;

        Ok(response)
    }
}
