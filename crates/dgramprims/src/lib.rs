//! Batched datagram I/O with permissive licensing.
//!
//! dgramprims moves many UDP or Unix datagrams between user space and the
//! kernel per system call (`recvmmsg(2)` / `sendmmsg(2)`), with pooled kernel
//! headers and optional peer-address resolution.
//!
//! # Crate Structure
//!
//! - [`transport`]: datagram sockets, endpoints, sockaddr codecs, readiness
//! - [`batch`]: messages, header pool, and the batch executors

/// Re-export transport types.
pub mod transport {
    pub use dgramprims_transport::*;
}

/// Re-export batch types.
pub mod batch {
    pub use dgramprims_batch::*;
}
