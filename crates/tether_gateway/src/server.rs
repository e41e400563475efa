//! # Gateway Server
//!
//! Accept loop and per-connection tasks. The listener is bound
//! synchronously by the caller so a port conflict fails enable instead of
//! dying silently in a background thread; the async runtime only handles
//! accepted traffic.

use crate::protocol::{authenticate, parse_frame, Frame};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tether_core::LoopHandle;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Errors raised while standing the gateway up.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Socket or runtime setup failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// The authenticated frame-to-loop bridge.
#[derive(Clone)]
pub struct GatewayServer {
    secret: String,
    loop_handle: LoopHandle,
}

impl GatewayServer {
    /// Creates a server that checks clients against `secret`.
    #[must_use]
    pub fn new(secret: &str, loop_handle: LoopHandle) -> Self {
        Self {
            secret: secret.to_string(),
            loop_handle,
        }
    }

    /// Accepts connections until the stop flag is raised.
    pub async fn serve(self, listener: TcpListener, stop: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer).await {
                                tracing::debug!(%peer, error = %e, "gateway connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway accept failed");
                    }
                },
                _ = ticker.tick() => {
                    if stop.load(Ordering::Relaxed) {
                        tracing::info!("gateway shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        // The opening line is the credential; nothing else is read before
        // it checks out.
        let Some(first) = lines.next_line().await? else {
            return Ok(());
        };
        if !authenticate(&first, &self.secret) {
            tracing::warn!(%peer, "gateway client failed authentication");
            writer.write_all(b"denied\n").await?;
            return Ok(());
        }
        writer.write_all(b"ok\n").await?;
        tracing::info!(%peer, "gateway client authenticated");

        while let Some(line) = lines.next_line().await? {
            match parse_frame(&line) {
                Frame::Alert(message) => {
                    if let Err(e) = self.loop_handle.broadcast(message) {
                        tracing::warn!(%peer, error = %e, "alert frame dropped");
                    }
                }
                Frame::Console(command) => {
                    if let Err(e) = self.loop_handle.run_command(command) {
                        tracing::warn!(%peer, error = %e, "console frame dropped");
                    }
                }
                Frame::Unknown(text) => {
                    tracing::debug!(%peer, frame = %text, "ignoring unknown gateway frame");
                }
            }
        }
        Ok(())
    }
}

/// Runs the gateway on its own runtime in a background thread.
///
/// The caller binds the listener so bind failures surface here, before any
/// thread exists.
pub fn spawn_gateway(
    server: GatewayServer,
    listener: std::net::TcpListener,
    stop: Arc<AtomicBool>,
) -> GatewayResult<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("gateway-io")
        .enable_all()
        .build()?;

    let handle = std::thread::Builder::new()
        .name("gateway".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                match TcpListener::from_std(listener) {
                    Ok(listener) => server.serve(listener, stop).await,
                    Err(e) => tracing::error!(error = %e, "gateway listener registration failed"),
                }
            });
        })?;
    Ok(handle)
}
