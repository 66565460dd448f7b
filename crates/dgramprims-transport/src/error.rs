use std::path::PathBuf;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified endpoint.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified peer.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The address cannot be used with this socket.
    #[error("address error: {0}")]
    Address(#[from] AddrError),

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint {input:?}: {reason}")]
    InvalidEndpoint { input: String, reason: String },
}

/// Errors raised while converting addresses to or from kernel `sockaddr` storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    /// The kernel reported an address family this codec does not understand.
    #[error("unsupported address family {0}")]
    UnsupportedFamily(i32),

    /// The kernel-reported address length is shorter than the family requires.
    #[error("address truncated ({len} bytes, need {need})")]
    Truncated { len: usize, need: usize },

    /// The address family does not match the socket's network.
    #[error("{address} cannot be used on a {network} socket")]
    FamilyMismatch { address: String, network: String },

    /// A unix socket path does not fit in `sun_path`.
    #[error("unix socket path too long ({len} bytes, max {max})")]
    PathTooLong { len: usize, max: usize },

    /// Datagrams cannot be addressed to an unnamed unix socket.
    #[error("cannot send to an unnamed unix socket")]
    UnnamedDestination,
}

pub type Result<T> = std::result::Result<T, TransportError>;
