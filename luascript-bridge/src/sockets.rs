//! Message sockets.
//!
//! A connector hands back a pair of channels right away; the actual connection
//! is established in the background and reported through [`SocketEvent::Open`].

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("unsupported socket URL: {0}")]
    UnsupportedUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Close { reason: String },
    Error(String),
}

/// Both directions of one connection.
///
/// Dropping `outgoing` asks the transport to shut the connection down.
pub struct SocketChannel {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketChannel {
    /// Creates a connected channel pair; returns the bridge side and the
    /// transport side.
    pub fn pair() -> (Self, TransportEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            TransportEnd {
                outgoing: out_rx,
                events: in_tx,
            },
        )
    }
}

/// The transport's half of a [`SocketChannel`].
pub struct TransportEnd {
    pub outgoing: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<SocketEvent>,
}

/// Opens connections for the `connect` capability.
pub trait SocketConnector {
    /// Starts connecting to `url`. Errors here mean the URL was rejected
    /// outright; later failures arrive as events.
    fn connect(&self, url: &str) -> Result<SocketChannel, SocketError>;
}

/// Newline-delimited text over TCP, addressed as `tcp://host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpLineConnector;

impl SocketConnector for TcpLineConnector {
    fn connect(&self, url: &str) -> Result<SocketChannel, SocketError> {
        let address = url
            .strip_prefix("tcp://")
            .map(|a| a.trim_end_matches('/'))
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SocketError::UnsupportedUrl(url.to_string()))?
            .to_string();

        let (channel, transport) = SocketChannel::pair();
        tokio::spawn(run_tcp(address, transport));
        Ok(channel)
    }
}

async fn run_tcp(address: String, transport: TransportEnd) {
    let TransportEnd {
        mut outgoing,
        events,
    } = transport;
    let emit = |event: SocketEvent| events.send(event).is_ok();

    let stream = match TcpStream::connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(address = %address, error = %e, "socket connect failed");
            emit(SocketEvent::Error(e.to_string()));
            emit(SocketEvent::Close {
                reason: e.to_string(),
            });
            return;
        }
    };
    debug!(address = %address, "socket open");
    if !emit(SocketEvent::Open) {
        return;
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !emit(SocketEvent::Message(line)) {
                        break;
                    }
                }
                Ok(None) => {
                    emit(SocketEvent::Close {
                        reason: "connection closed by peer".to_string(),
                    });
                    break;
                }
                Err(e) => {
                    emit(SocketEvent::Error(e.to_string()));
                    emit(SocketEvent::Close { reason: e.to_string() });
                    break;
                }
            },
            message = outgoing.recv() => match message {
                Some(text) => {
                    let mut frame = text.into_bytes();
                    frame.push(b'\n');
                    if let Err(e) = writer.write_all(&frame).await {
                        emit(SocketEvent::Error(e.to_string()));
                        emit(SocketEvent::Close { reason: e.to_string() });
                        break;
                    }
                }
                // Bridge side dropped: closed by the script.
                None => break,
            },
        }
    }
    debug!(address = %address, "socket finished");
}
