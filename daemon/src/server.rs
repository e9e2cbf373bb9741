use shared::ipc::{Command, Response, StatusInfo};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Local control socket. Answers status queries from the latest snapshot the
/// conversation loop published and turns `Shutdown` into an interrupt.
pub struct StatusServer {
    socket_path: PathBuf,
    status_rx: watch::Receiver<StatusInfo>,
    interrupt: Arc<AtomicBool>,
    io_timeout: Duration,
}

impl StatusServer {
    pub fn new(
        socket_path: PathBuf,
        status_rx: watch::Receiver<StatusInfo>,
        interrupt: Arc<AtomicBool>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            socket_path,
            status_rx,
            interrupt,
            io_timeout,
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    pub fn bind(&self) -> anyhow::Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        info!("Starting socket server at {}", self.socket_path.display());
        let listener = UnixListener::bind(&self.socket_path)?;
        debug!("Listener bound successfully");
        Ok(listener)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> anyhow::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Connection accepted");
                    let status_rx = self.status_rx.clone();
                    let interrupt = Arc::clone(&self.interrupt);
                    let io_timeout = self.io_timeout;
                    tokio::spawn(async move {
                        let handled = tokio::time::timeout(
                            io_timeout,
                            Self::handle_connection(status_rx, interrupt, stream),
                        )
                        .await;
                        match handled {
                            Ok(Ok(())) => debug!("Connection handled successfully"),
                            Ok(Err(e)) => error!("Error handling connection: {}", e),
                            Err(_) => error!("Connection timed out after {:?}", io_timeout),
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        status_rx: watch::Receiver<StatusInfo>,
        interrupt: Arc<AtomicBool>,
        mut stream: UnixStream,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; 1024];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            return Ok(());
        }

        buffer.truncate(n);

        let response = match serde_json::from_slice::<Command>(&buffer) {
            Ok(command) => {
                info!("Received command: {:?}", command);
                handle_command(command, &status_rx, &interrupt)
            }
            Err(e) => Response::Error(format!("invalid command: {}", e)),
        };

        let response_json = serde_json::to_vec(&response)?;
        stream.write_all(&response_json).await?;

        debug!("Sent response: {:?}", response);

        Ok(())
    }
}

fn handle_command(
    command: Command,
    status_rx: &watch::Receiver<StatusInfo>,
    interrupt: &AtomicBool,
) -> Response {
    match command {
        Command::Status => Response::Status(status_rx.borrow().clone()),
        Command::Shutdown => {
            info!("Shutdown requested over the control socket");
            interrupt.store(true, Ordering::SeqCst);
            Response::Ok
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
