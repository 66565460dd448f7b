//! Batched datagram transfer over `recvmmsg(2)` / `sendmmsg(2)`.
//!
//! Many independent datagrams move between user space and the kernel in a
//! single system call. Each logical operation:
//!
//! 1. borrows a kernel header array from a [`HeaderPool`],
//! 2. packs the caller's [`Message`]s into it,
//! 3. runs the batched syscall through the socket's readiness-retry facility,
//! 4. unpacks per-message results (lengths, flags, peer addresses),
//! 5. returns the array to the pool, on every exit path.
//!
//! A count smaller than the number of submitted messages is a partial
//! completion, not an error: resubmit the remaining suffix.
//!
//! ```no_run
//! use dgramprims_batch::{BatchConn, Message};
//! use dgramprims_transport::DatagramSocket;
//!
//! let socket = DatagramSocket::bind_udp("127.0.0.1:5300".parse()?)?;
//! let conn = BatchConn::from_socket(socket);
//!
//! let mut bufs = vec![[0u8; 1500]; 16];
//! let mut msgs: Vec<Message<'_>> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
//! let n = conn.recv_batch(&mut msgs, 0)?;
//! for m in &msgs[..n] {
//!     println!("{} bytes from {:?}", m.n, m.addr);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod conn;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod message;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod pack;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod pool;

#[cfg(all(feature = "async", any(target_os = "linux", target_os = "android")))]
pub mod async_conn;

pub use config::{BatchConfig, DEFAULT_BATCH_SIZE};
pub use error::{BatchError, Result};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use conn::BatchConn;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use message::Message;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use pool::{HeaderArray, HeaderPool, PooledHeaders};

#[cfg(all(feature = "async", any(target_os = "linux", target_os = "android")))]
pub use async_conn::AsyncBatchConn;
