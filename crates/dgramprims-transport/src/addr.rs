use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::str::FromStr;

use crate::error::{AddrError, TransportError};

/// Offset of `sun_path` inside `sockaddr_un`.
const SUN_PATH_OFFSET: usize = mem::offset_of!(libc::sockaddr_un, sun_path);

/// The kind of network a socket speaks.
///
/// Only connectionless networks carry a per-datagram peer address; for the
/// others the peer is fixed by the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Udp,
    Udp4,
    Udp6,
    Unixgram,
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
    UnixPacket,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Udp => "udp",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
            Network::Unixgram => "unixgram",
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
            Network::UnixPacket => "unixpacket",
        }
    }

    /// Whether each datagram carries its own peer address.
    pub fn is_connectionless(self) -> bool {
        matches!(self, Network::Udp | Network::Udp4 | Network::Udp6 | Network::Unixgram)
    }

    /// Whether this network uses `AF_UNIX` addresses.
    pub fn is_unix(self) -> bool {
        matches!(self, Network::Unixgram | Network::Unix | Network::UnixPacket)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Network::Udp),
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            "unixgram" => Ok(Network::Unixgram),
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            "unixpacket" => Ok(Network::UnixPacket),
            _ => Err(TransportError::InvalidEndpoint {
                input: s.to_string(),
                reason: "unknown network".to_string(),
            }),
        }
    }
}

/// Address of a unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnixAddress {
    /// A socket that was never bound (e.g. the sending side of an unbound unixgram socket).
    Unnamed,
    /// A filesystem path.
    Pathname(PathBuf),
    /// A Linux abstract-namespace name, without the leading NUL.
    Abstract(Vec<u8>),
}

/// A peer or local address understood by the datagram transports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    Inet(SocketAddr),
    Unix(UnixAddress),
}

impl SocketAddress {
    /// Filesystem-path unix address.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        SocketAddress::Unix(UnixAddress::Pathname(path.as_ref().to_path_buf()))
    }

    pub fn as_inet(&self) -> Option<SocketAddr> {
        match self {
            SocketAddress::Inet(addr) => Some(*addr),
            SocketAddress::Unix(_) => None,
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, SocketAddress::Unix(_))
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        SocketAddress::Inet(addr)
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Inet(addr) => write!(f, "{addr}"),
            SocketAddress::Unix(UnixAddress::Unnamed) => f.write_str("(unnamed)"),
            SocketAddress::Unix(UnixAddress::Pathname(path)) => write!(f, "{}", path.display()),
            SocketAddress::Unix(UnixAddress::Abstract(name)) => {
                write!(f, "@{}", String::from_utf8_lossy(name))
            }
        }
    }
}

/// A datagram endpoint: network plus address.
///
/// Parsed from `udp://127.0.0.1:9000`, `udp4://host:port`, `udp6://[::1]:9000`,
/// `unixgram:///tmp/x.sock`, `unixgram://@name`, a bare `host:port` (udp) or a
/// bare path (unixgram).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub network: Network,
    pub address: SocketAddress,
}

impl Endpoint {
    pub fn new(network: Network, address: SocketAddress) -> Self {
        Self { network, address }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.address)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (network, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme.parse::<Network>()?, rest),
            None if s.starts_with('/') || s.starts_with('.') || s.starts_with('@') => {
                (Network::Unixgram, s)
            }
            None => (Network::Udp, s),
        };

        if rest.is_empty() {
            return Err(invalid("missing address"));
        }

        match network {
            Network::Udp | Network::Udp4 | Network::Udp6 => {
                let candidates = rest
                    .to_socket_addrs()
                    .map_err(|err| invalid(&format!("cannot resolve address: {err}")))?;
                let addr = candidates
                    .filter(|addr| match network {
                        Network::Udp4 => addr.is_ipv4(),
                        Network::Udp6 => addr.is_ipv6(),
                        _ => true,
                    })
                    .next()
                    .ok_or_else(|| invalid("no address of the requested family"))?;
                Ok(Endpoint::new(network, SocketAddress::Inet(addr)))
            }
            Network::Unixgram => {
                let address = match rest.strip_prefix('@') {
                    Some("") => return Err(invalid("empty abstract socket name")),
                    Some(name) => UnixAddress::Abstract(name.as_bytes().to_vec()),
                    None => UnixAddress::Pathname(PathBuf::from(rest)),
                };
                Ok(Endpoint::new(network, SocketAddress::Unix(address)))
            }
            _ => Err(invalid(
                "only udp, udp4, udp6 and unixgram endpoints are supported",
            )),
        }
    }
}

/// Converts addresses to and from the kernel `sockaddr` representation.
///
/// The batch engine takes an `Option<&dyn AddressCodec>`: with no codec, no
/// peer addresses are encoded on send or decoded on receive.
pub trait AddressCodec: Send + Sync {
    /// Encode `addr` into `dst`, returning the number of meaningful bytes.
    fn encode(
        &self,
        addr: &SocketAddress,
        dst: &mut libc::sockaddr_storage,
    ) -> Result<libc::socklen_t, AddrError>;

    /// Decode the first `len` bytes of `src` as an address of `network`.
    fn decode(
        &self,
        src: &libc::sockaddr_storage,
        len: libc::socklen_t,
        network: Network,
    ) -> Result<SocketAddress, AddrError>;
}

/// `AddressCodec` for `AF_INET`, `AF_INET6` and `AF_UNIX`.
///
/// When bound to a network with [`SockaddrCodec::for_network`], IPv4
/// destinations are sent as v4-mapped IPv6 on `udp6` sockets and IPv6
/// destinations are rejected on `udp4` sockets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockaddrCodec {
    network: Option<Network>,
}

impl SockaddrCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_network(network: Network) -> Self {
        Self {
            network: Some(network),
        }
    }

    fn mismatch(&self, addr: &SocketAddress) -> AddrError {
        AddrError::FamilyMismatch {
            address: addr.to_string(),
            network: self
                .network
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl AddressCodec for SockaddrCodec {
    fn encode(
        &self,
        addr: &SocketAddress,
        dst: &mut libc::sockaddr_storage,
    ) -> Result<libc::socklen_t, AddrError> {
        match (addr, self.network) {
            (SocketAddress::Inet(_), Some(network)) if network.is_unix() => {
                Err(self.mismatch(addr))
            }
            (SocketAddress::Unix(_), Some(network)) if !network.is_unix() => {
                Err(self.mismatch(addr))
            }
            (SocketAddress::Inet(SocketAddr::V4(v4)), Some(Network::Udp6 | Network::Tcp6)) => {
                let mapped = SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0);
                Ok(encode_v6(&mapped, dst))
            }
            (SocketAddress::Inet(SocketAddr::V6(v6)), Some(Network::Udp4 | Network::Tcp4)) => {
                match v6.ip().to_ipv4_mapped() {
                    Some(ip) => Ok(encode_v4(&SocketAddrV4::new(ip, v6.port()), dst)),
                    None => Err(self.mismatch(addr)),
                }
            }
            (SocketAddress::Inet(SocketAddr::V4(v4)), _) => Ok(encode_v4(v4, dst)),
            (SocketAddress::Inet(SocketAddr::V6(v6)), _) => Ok(encode_v6(v6, dst)),
            (SocketAddress::Unix(unix), _) => encode_unix(unix, dst),
        }
    }

    fn decode(
        &self,
        src: &libc::sockaddr_storage,
        len: libc::socklen_t,
        network: Network,
    ) -> Result<SocketAddress, AddrError> {
        let len = (len as usize).min(mem::size_of::<libc::sockaddr_storage>());
        if len == 0 {
            // The kernel reports no name for unbound unix peers.
            if network.is_unix() {
                return Ok(SocketAddress::Unix(UnixAddress::Unnamed));
            }
            return Err(AddrError::Truncated {
                len: 0,
                need: mem::size_of::<libc::sockaddr_in>(),
            });
        }

        let raw: *const libc::sockaddr_storage = src;
        let family = i32::from(src.ss_family);
        match family {
            libc::AF_INET | libc::AF_INET6 if network.is_unix() => {
                Err(AddrError::FamilyMismatch {
                    address: format!("family {family}"),
                    network: network.to_string(),
                })
            }
            libc::AF_INET => {
                let need = mem::size_of::<libc::sockaddr_in>();
                if len < need {
                    return Err(AddrError::Truncated { len, need });
                }
                // SAFETY: `sockaddr_storage` is large and aligned enough for any
                // sockaddr, and the family tag says this one is a `sockaddr_in`.
                let sin = unsafe { &*raw.cast::<libc::sockaddr_in>() };
                let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                let port = u16::from_be(sin.sin_port);
                Ok(SocketAddress::Inet(SocketAddr::V4(SocketAddrV4::new(ip, port))))
            }
            libc::AF_INET6 => {
                let need = mem::size_of::<libc::sockaddr_in6>();
                if len < need {
                    return Err(AddrError::Truncated { len, need });
                }
                // SAFETY: as above, for `sockaddr_in6`.
                let sin6 = unsafe { &*raw.cast::<libc::sockaddr_in6>() };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                let port = u16::from_be(sin6.sin6_port);
                Ok(SocketAddress::Inet(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    port,
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                ))))
            }
            libc::AF_UNIX => {
                if !network.is_unix() {
                    return Err(AddrError::FamilyMismatch {
                        address: "unix socket".to_string(),
                        network: network.to_string(),
                    });
                }
                // SAFETY: as above, for `sockaddr_un`.
                let sun = unsafe { &*raw.cast::<libc::sockaddr_un>() };
                Ok(SocketAddress::Unix(decode_unix(sun, len)))
            }
            other => Err(AddrError::UnsupportedFamily(other)),
        }
    }
}

fn encode_v4(addr: &SocketAddrV4, dst: &mut libc::sockaddr_storage) -> libc::socklen_t {
    // SAFETY: all-zero is a valid `sockaddr_in`.
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(addr.ip().octets()),
    };
    // SAFETY: `sockaddr_storage` is at least as large and as aligned as `sockaddr_in`.
    unsafe { ptr::write((dst as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in>(), sin) };
    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
}

fn encode_v6(addr: &SocketAddrV6, dst: &mut libc::sockaddr_storage) -> libc::socklen_t {
    // SAFETY: all-zero is a valid `sockaddr_in6`.
    let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sin6.sin6_port = addr.port().to_be();
    sin6.sin6_flowinfo = addr.flowinfo();
    sin6.sin6_addr = libc::in6_addr {
        s6_addr: addr.ip().octets(),
    };
    sin6.sin6_scope_id = addr.scope_id();
    // SAFETY: `sockaddr_storage` is at least as large and as aligned as `sockaddr_in6`.
    unsafe { ptr::write((dst as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in6>(), sin6) };
    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
}

fn encode_unix(
    addr: &UnixAddress,
    dst: &mut libc::sockaddr_storage,
) -> Result<libc::socklen_t, AddrError> {
    // SAFETY: all-zero is a valid `sockaddr_un`.
    let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
    sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let max = sun.sun_path.len();

    let used = match addr {
        UnixAddress::Unnamed => return Err(AddrError::UnnamedDestination),
        UnixAddress::Pathname(path) => {
            let bytes = path.as_os_str().as_bytes();
            // Leave room for the trailing NUL.
            if bytes.len() >= max {
                return Err(AddrError::PathTooLong {
                    len: bytes.len(),
                    max: max - 1,
                });
            }
            for (dst, src) in sun.sun_path.iter_mut().zip(bytes) {
                *dst = *src as libc::c_char;
            }
            bytes.len() + 1
        }
        UnixAddress::Abstract(name) => {
            if name.len() + 1 > max {
                return Err(AddrError::PathTooLong {
                    len: name.len(),
                    max: max - 1,
                });
            }
            for (dst, src) in sun.sun_path[1..].iter_mut().zip(name) {
                *dst = *src as libc::c_char;
            }
            name.len() + 1
        }
    };

    // SAFETY: `sockaddr_storage` is at least as large and as aligned as `sockaddr_un`.
    unsafe { ptr::write((dst as *mut libc::sockaddr_storage).cast::<libc::sockaddr_un>(), sun) };
    Ok((SUN_PATH_OFFSET + used) as libc::socklen_t)
}

fn decode_unix(sun: &libc::sockaddr_un, len: usize) -> UnixAddress {
    let path_len = len
        .saturating_sub(SUN_PATH_OFFSET)
        .min(sun.sun_path.len());
    if path_len == 0 {
        return UnixAddress::Unnamed;
    }
    let raw: Vec<u8> = sun.sun_path[..path_len].iter().map(|c| *c as u8).collect();
    if raw[0] == 0 {
        return UnixAddress::Abstract(raw[1..].to_vec());
    }
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    UnixAddress::Pathname(PathBuf::from(std::ffi::OsStr::from_bytes(&raw[..end])))
}
