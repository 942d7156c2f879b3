//! One bounded-timeout TCP connect attempt.
use log::debug;
use std::{fmt, io::ErrorKind, net::SocketAddr, time::Duration};
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpStream,
    time,
};

/// Why a port did not accept a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Refused,
    TimedOut,
    Reset,
    Unreachable,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Refused => "connection refused",
            Self::TimedOut => "timed out",
            Self::Reset => "connection reset",
            Self::Unreachable => "unreachable",
        };
        f.write_str(reason)
    }
}

/// The classified result of a single probe.
///
/// `Closed` and `Error` are treated the same way in the scan result; `Error`
/// is kept apart so local failures such as file-descriptor exhaustion can be
/// counted instead of silently passing for closed ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed(CloseReason),
    Error(String),
}

impl ProbeOutcome {
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Classifies a connect failure.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Closed(CloseReason::Refused),
            ErrorKind::TimedOut => Self::Closed(CloseReason::TimedOut),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                Self::Closed(CloseReason::Reset)
            }
            ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
                Self::Closed(CloseReason::Unreachable)
            }
            _ => Self::Error(err.to_string()),
        }
    }
}

/// Performs connect probes with a fixed per-probe timeout.
#[derive(Debug, Clone, Copy)]
pub struct ScannerConnector {
    timeout: Duration,
}

impl ScannerConnector {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connects to `socket` and classifies the result. A successful stream
    /// is shut down straight away; nothing is sent or read.
    pub async fn probe(&self, socket: SocketAddr) -> ProbeOutcome {
        match self.connect(socket).await {
            Ok(tcp_stream) => {
                debug!("Connection was successful, shutting down stream {socket}");
                if let Err(e) = { tcp_stream }.shutdown().await {
                    debug!("Shutdown stream error {e}");
                }
                ProbeOutcome::Open
            }
            Err(e) => {
                let outcome = ProbeOutcome::from_io_error(&e);
                debug!("Probe {socket} failed: {e}");
                outcome
            }
        }
    }

    /// Performs the connection to the socket with timeout. An elapsed
    /// timeout surfaces as `ErrorKind::TimedOut`.
    async fn connect(&self, socket: SocketAddr) -> io::Result<TcpStream> {
        time::timeout(self.timeout, TcpStream::connect(socket))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "connect timed out"))?
    }
}
