use std::mem;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::addr::{Endpoint, Network, SocketAddress, UnixAddress};
use crate::error::{Result, TransportError};
use crate::raw::{retry_on_ready, Interest, RawConn};

/// Non-blocking datagram socket (UDP or unixgram).
///
/// Implements [`RawConn`]: operations run directly on the descriptor and,
/// when they would block, wait for readiness with `poll(2)`, bounded by the
/// configured read/write timeouts.
///
/// Filesystem unixgram sockets created by [`DatagramSocket::bind_unixgram`]
/// remove their path on drop, as long as the path still refers to the socket
/// that was created.
pub struct DatagramSocket {
    inner: DatagramInner,
    network: Network,
    /// Timeouts in nanoseconds; zero means none.
    read_timeout: AtomicU64,
    write_timeout: AtomicU64,
    path: Option<PathBuf>,
    created_inode: Option<(u64, u64)>,
    cleanup_on_drop: bool,
}

enum DatagramInner {
    Udp(UdpSocket),
    Unix(UnixDatagram),
}

impl DatagramSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Size of `sockaddr_un.sun_path`. Socket paths must be shorter, leaving
    /// room for the terminating NUL.
    pub const MAX_PATH_LEN: usize =
        mem::size_of::<libc::sockaddr_un>() - mem::offset_of!(libc::sockaddr_un, sun_path);

    /// Bind a socket for `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match (&endpoint.network, &endpoint.address) {
            (Network::Udp | Network::Udp4 | Network::Udp6, SocketAddress::Inet(addr)) => {
                Self::bind_udp(*addr)
            }
            (Network::Unixgram, SocketAddress::Unix(UnixAddress::Pathname(path))) => {
                Self::bind_unixgram(path)
            }
            (Network::Unixgram, SocketAddress::Unix(UnixAddress::Abstract(name))) => {
                Self::bind_unixgram_abstract(name)
            }
            (Network::Unixgram, SocketAddress::Unix(UnixAddress::Unnamed)) => {
                Self::unbound_unixgram()
            }
            _ => Err(TransportError::InvalidEndpoint {
                input: endpoint.to_string(),
                reason: "address does not match network".to_string(),
            }),
        }
    }

    /// Bind a UDP socket. The network is `udp4` or `udp6` depending on `addr`.
    pub fn bind_udp(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind {
            endpoint: addr.to_string(),
            source: e,
        })?;
        socket.set_nonblocking(true)?;
        let network = if addr.is_ipv4() {
            Network::Udp4
        } else {
            Network::Udp6
        };
        info!(local = %socket.local_addr()?, %network, "bound datagram socket");
        Ok(Self::from_inner(DatagramInner::Udp(socket), network))
    }

    /// Bind a filesystem-path unixgram socket.
    ///
    /// If the path already exists and is a socket, it is removed first (stale
    /// socket cleanup). Any other existing file is left alone and the bind fails.
    pub fn bind_unixgram(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_unixgram_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind a filesystem-path unixgram socket with explicit mode.
    pub fn bind_unixgram_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            endpoint: path.display().to_string(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
            } else {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
        }

        let socket = UnixDatagram::bind(&path).map_err(|e| bind_err(&path, e))?;
        socket.set_nonblocking(true)?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "bound unixgram socket");

        let mut this = Self::from_inner(DatagramInner::Unix(socket), Network::Unixgram);
        this.created_inode = Some((created.dev(), created.ino()));
        this.path = Some(path);
        this.cleanup_on_drop = true;
        Ok(this)
    }

    /// Bind a unixgram socket in the Linux abstract namespace.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn bind_unixgram_abstract(name: &[u8]) -> Result<Self> {
        #[cfg(target_os = "android")]
        use std::os::android::net::SocketAddrExt;
        #[cfg(target_os = "linux")]
        use std::os::linux::net::SocketAddrExt;

        let endpoint = format!("@{}", String::from_utf8_lossy(name));
        let addr = std::os::unix::net::SocketAddr::from_abstract_name(name).map_err(|e| {
            TransportError::Bind {
                endpoint: endpoint.clone(),
                source: e,
            }
        })?;
        let socket = UnixDatagram::bind_addr(&addr).map_err(|e| TransportError::Bind {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        socket.set_nonblocking(true)?;
        info!(%endpoint, "bound unixgram socket");
        Ok(Self::from_inner(DatagramInner::Unix(socket), Network::Unixgram))
    }

    /// Abstract-namespace sockets are Linux-only.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn bind_unixgram_abstract(name: &[u8]) -> Result<Self> {
        Err(TransportError::Bind {
            endpoint: format!("@{}", String::from_utf8_lossy(name)),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "abstract unix sockets require Linux",
            ),
        })
    }

    /// An unbound unixgram socket, typically used only for sending.
    pub fn unbound_unixgram() -> Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.set_nonblocking(true)?;
        Ok(Self::from_inner(DatagramInner::Unix(socket), Network::Unixgram))
    }

    /// A pair of connected unixgram sockets.
    pub fn unixgram_pair() -> Result<(Self, Self)> {
        let (a, b) = UnixDatagram::pair()?;
        a.set_nonblocking(true)?;
        b.set_nonblocking(true)?;
        Ok((
            Self::from_inner(DatagramInner::Unix(a), Network::Unixgram),
            Self::from_inner(DatagramInner::Unix(b), Network::Unixgram),
        ))
    }

    fn from_inner(inner: DatagramInner, network: Network) -> Self {
        Self {
            inner,
            network,
            read_timeout: AtomicU64::new(0),
            write_timeout: AtomicU64::new(0),
            path: None,
            created_inode: None,
            cleanup_on_drop: false,
        }
    }

    /// Fix the default peer. Datagrams from other peers are dropped by the kernel.
    pub fn connect(&self, peer: &SocketAddress) -> Result<()> {
        let connect_err = |source: std::io::Error| TransportError::Connect {
            endpoint: peer.to_string(),
            source,
        };
        match (&self.inner, peer) {
            (DatagramInner::Udp(socket), SocketAddress::Inet(addr)) => {
                socket.connect(addr).map_err(connect_err)?
            }
            (DatagramInner::Unix(socket), SocketAddress::Unix(UnixAddress::Pathname(path))) => {
                socket.connect(path).map_err(connect_err)?
            }
            #[cfg(any(target_os = "linux", target_os = "android"))]
            (DatagramInner::Unix(socket), SocketAddress::Unix(UnixAddress::Abstract(name))) => {
                #[cfg(target_os = "android")]
                use std::os::android::net::SocketAddrExt;
                #[cfg(target_os = "linux")]
                use std::os::linux::net::SocketAddrExt;

                let addr =
                    std::os::unix::net::SocketAddr::from_abstract_name(name).map_err(connect_err)?;
                socket.connect_addr(&addr).map_err(connect_err)?
            }
            _ => {
                return Err(connect_err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("cannot connect a {} socket to {peer}", self.network),
                )))
            }
        }
        debug!(%peer, "connected datagram socket");
        Ok(())
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddress> {
        match &self.inner {
            DatagramInner::Udp(socket) => Ok(SocketAddress::Inet(socket.local_addr()?)),
            DatagramInner::Unix(socket) => {
                let addr = socket.local_addr()?;
                if let Some(path) = addr.as_pathname() {
                    return Ok(SocketAddress::unix(path));
                }
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    #[cfg(target_os = "android")]
                    use std::os::android::net::SocketAddrExt;
                    #[cfg(target_os = "linux")]
                    use std::os::linux::net::SocketAddrExt;

                    if let Some(name) = addr.as_abstract_name() {
                        return Ok(SocketAddress::Unix(UnixAddress::Abstract(name.to_vec())));
                    }
                }
                Ok(SocketAddress::Unix(UnixAddress::Unnamed))
            }
        }
    }

    /// The network this socket speaks.
    pub fn network(&self) -> Network {
        self.network
    }

    /// The filesystem path this socket is bound to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self.inner {
            DatagramInner::Udp(_) => "udp",
            DatagramInner::Unix(_) => "unixgram",
        }
    }

    /// Bound how long a read operation may wait for readiness.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        store_timeout(&self.read_timeout, timeout)
    }

    /// Bound how long a write operation may wait for readiness.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        store_timeout(&self.write_timeout, timeout)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        load_timeout(&self.read_timeout)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        load_timeout(&self.write_timeout)
    }
}

fn store_timeout(slot: &AtomicU64, timeout: Option<Duration>) -> Result<()> {
    let nanos = match timeout {
        None => 0,
        Some(t) if t.is_zero() => {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot set a 0 duration timeout",
            )))
        }
        Some(t) => u64::try_from(t.as_nanos()).unwrap_or(u64::MAX),
    };
    slot.store(nanos, Ordering::Relaxed);
    Ok(())
}

fn load_timeout(slot: &AtomicU64) -> Option<Duration> {
    match slot.load(Ordering::Relaxed) {
        0 => None,
        nanos => Some(Duration::from_nanos(nanos)),
    }
}

impl RawConn for DatagramSocket {
    fn read(&self, f: &mut dyn FnMut(RawFd) -> bool) -> std::io::Result<()> {
        retry_on_ready(self.as_raw_fd(), Interest::Readable, self.read_timeout(), f)
    }

    fn write(&self, f: &mut dyn FnMut(RawFd) -> bool) -> std::io::Result<()> {
        retry_on_ready(self.as_raw_fd(), Interest::Writable, self.write_timeout(), f)
    }
}

impl AsRawFd for DatagramSocket {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            DatagramInner::Udp(socket) => socket.as_raw_fd(),
            DatagramInner::Unix(socket) => socket.as_raw_fd(),
        }
    }
}

impl AsFd for DatagramSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match &self.inner {
            DatagramInner::Udp(socket) => socket.as_fd(),
            DatagramInner::Unix(socket) => socket.as_fd(),
        }
    }
}

impl std::fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("network", &self.network)
            .field("fd", &self.as_raw_fd())
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        if let (Some(path), Some((expected_dev, expected_ino))) = (&self.path, self.created_inode)
        {
            if let Ok(metadata) = std::fs::symlink_metadata(path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(?path, "cleaning up socket file");
                    let _ = std::fs::remove_file(path);
                } else {
                    debug!(?path, "socket path identity changed; skipping cleanup");
                }
            }
        }
    }
}
