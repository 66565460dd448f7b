//! Datagram transport primitives for batched I/O.
//!
//! Provides the pieces the batch engine consumes through narrow interfaces:
//! - [`Network`], [`SocketAddress`] and [`Endpoint`] naming what a socket talks to
//! - [`AddressCodec`] converting addresses to and from kernel `sockaddr` storage
//! - [`RawConn`], the "run this on the raw descriptor, retry on readiness" facility
//! - [`DatagramSocket`], a non-blocking UDP / unixgram socket implementing [`RawConn`]
//! - [`BatchSyscall`], the `recvmmsg(2)` / `sendmmsg(2)` bindings (Linux, Android)
//!
//! This is the lowest layer of dgramprims. The batch engine builds on top of it.

pub mod error;

#[cfg(unix)]
pub mod addr;
#[cfg(unix)]
pub mod raw;
#[cfg(unix)]
pub mod socket;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod sys;

pub use error::{AddrError, Result, TransportError};

#[cfg(unix)]
pub use addr::{AddressCodec, Endpoint, Network, SockaddrCodec, SocketAddress, UnixAddress};
#[cfg(unix)]
pub use raw::{retry_on_ready, wait_ready, Interest, RawConn};
#[cfg(unix)]
pub use socket::DatagramSocket;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use sys::{BatchSyscall, Mmsg};
