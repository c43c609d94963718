use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::{Envelope, Publisher};
use crate::backoff::{self, SystemClock};
use crate::codec::WireMessage;
use crate::error::{ExecutorError, Result};

/// How long to keep retrying the initial connection to the broker.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

enum Stream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.write_all(frame).await?;
                stream.flush().await
            }
            Self::Tcp(stream) => {
                stream.write_all(frame).await?;
                stream.flush().await
            }
        }
    }
}

/// Publishes length-prefixed envelopes over a Unix or TCP socket.
///
/// The executor loop is synchronous, so the publisher drives its own
/// current-thread runtime and blocks on each write.
pub struct SocketPublisher {
    runtime: Runtime,
    stream: Stream,
    peer: String,
}

impl SocketPublisher {
    #[cfg(unix)]
    pub fn connect_unix(path: &str) -> Result<Self> {
        let owned = path.to_string();
        Self::connect_with(path, move |runtime| {
            runtime.block_on(UnixStream::connect(&owned)).map(Stream::Unix)
        })
    }

    #[cfg(not(unix))]
    pub fn connect_unix(path: &str) -> Result<Self> {
        Err(ExecutorError::Config(format!(
            "unix sockets are not available on this platform: {}",
            path
        )))
    }

    pub fn connect_tcp(addr: &str) -> Result<Self> {
        let owned = addr.to_string();
        Self::connect_with(addr, move |runtime| {
            runtime.block_on(TcpStream::connect(owned.as_str())).map(Stream::Tcp)
        })
    }

    fn connect_with<F>(peer: &str, mut connect: F) -> Result<Self>
    where
        F: FnMut(&Runtime) -> std::io::Result<Stream>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;

        let mut stream = None;
        let mut last_error = None;
        let connected = backoff::retry_with_backoff_for(&SystemClock, CONNECT_TIMEOUT, || {
            match connect(&runtime) {
                Ok(s) => {
                    stream = Some(s);
                    true
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Broker connection attempt failed");
                    last_error = Some(e);
                    false
                }
            }
        });

        match stream {
            Some(stream) if connected => {
                info!(peer = %peer, "Connected to message broker");
                Ok(Self {
                    runtime,
                    stream,
                    peer: peer.to_string(),
                })
            }
            _ => {
                let reason = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "timed out".to_string());
                warn!(peer = %peer, "Giving up on message broker");
                Err(ExecutorError::Transport(format!(
                    "unable to connect to {}: {}",
                    peer, reason
                )))
            }
        }
    }
}

impl Publisher for SocketPublisher {
    fn publish(&mut self, queue: &str, message: &WireMessage) -> Result<()> {
        let envelope = Envelope {
            queue: queue.to_string(),
            message: message.clone(),
        };
        let frame = envelope
            .encode_frame()
            .map_err(|e| ExecutorError::Transport(format!("failed to encode envelope: {}", e)))?;

        let Self { runtime, stream, peer } = self;
        runtime
            .block_on(stream.write_frame(&frame))
            .map_err(|e| ExecutorError::Transport(format!("write to {} failed: {}", peer, e)))
    }
}
