//! Tokio executor for batched transfer.
//!
//! Readiness comes from the tokio reactor instead of `poll(2)`. Dropping a
//! pending future cancels the operation and still returns its header array to
//! the pool. Use `tokio::time::timeout` for deadlines.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use dgramprims_transport::{AddressCodec, BatchSyscall, DatagramSocket, Mmsg, Network};
use tokio::io::unix::AsyncFd;
use tracing::trace;

use crate::config::BatchConfig;
use crate::conn::{check_completed, default_codec, pool_for, RECVMMSG, SENDMMSG};
use crate::error::{BatchError, Result};
use crate::message::Message;
use crate::pool::HeaderPool;

pub struct AsyncBatchConn<S = Mmsg> {
    inner: AsyncFd<DatagramSocket>,
    syscalls: S,
    network: Network,
    codec: Option<Arc<dyn AddressCodec>>,
    pool: Arc<HeaderPool>,
}

impl AsyncBatchConn {
    /// Register `socket` with the current tokio reactor.
    ///
    /// Must be called from within a runtime.
    pub fn new(socket: DatagramSocket) -> io::Result<Self> {
        Self::with_config(socket, &BatchConfig::default())
    }

    /// Register `socket` using `config`.
    ///
    /// # Panics
    /// Panics if `config.batch_size` is 0.
    pub fn with_config(socket: DatagramSocket, config: &BatchConfig) -> io::Result<Self> {
        let network = socket.network();
        let pool = pool_for(config);
        Ok(Self {
            inner: AsyncFd::new(socket)?,
            syscalls: Mmsg,
            network,
            codec: default_codec(network, config),
            pool,
        })
    }
}

impl<S: BatchSyscall> AsyncBatchConn<S> {
    pub fn with_pool(mut self, pool: Arc<HeaderPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_address_codec(mut self, codec: Option<Arc<dyn AddressCodec>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_syscalls<T: BatchSyscall>(self, syscalls: T) -> AsyncBatchConn<T> {
        AsyncBatchConn {
            inner: self.inner,
            syscalls,
            network: self.network,
            codec: self.codec,
            pool: self.pool,
        }
    }

    pub fn get_ref(&self) -> &DatagramSocket {
        self.inner.get_ref()
    }

    /// Deregister from the reactor and hand the socket back.
    pub fn into_inner(self) -> DatagramSocket {
        self.inner.into_inner()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn batch_size(&self) -> usize {
        self.pool.batch_size()
    }

    pub fn pool(&self) -> &Arc<HeaderPool> {
        &self.pool
    }

    /// Async counterpart of [`BatchConn::recv_batch`](crate::BatchConn::recv_batch).
    pub async fn recv_batch(&self, messages: &mut [Message<'_>], flags: i32) -> Result<usize> {
        let mut headers = self.pool.borrow();
        if messages.is_empty() {
            return Ok(0);
        }
        let codec = self.codec.as_deref();
        headers.pack(messages, codec, None)?;

        let submitted = messages.len();
        let mut retries = 0u32;
        let completed = loop {
            let mut guard = self.inner.readable().await.map_err(BatchError::Wait)?;
            let attempt = guard.try_io(|fd| {
                restarting(|| {
                    // SAFETY: `pack` pointed every header at `messages`, which
                    // outlive this future.
                    unsafe {
                        self.syscalls
                            .recv_mmsg(fd.as_raw_fd(), headers.headers_mut(), flags)
                    }
                })
            });
            match attempt {
                Ok(Ok(n)) => break n,
                Ok(Err(source)) => return Err(BatchError::Syscall { op: RECVMMSG, source }),
                Err(_would_block) => retries += 1,
            }
        };
        if retries > 0 {
            trace!(op = RECVMMSG, retries, "batch completed after waiting for readiness");
        }
        let n = check_completed(RECVMMSG, completed, submitted)?;

        headers.truncate(n);
        headers.unpack(&mut messages[..n], codec, self.network)?;
        Ok(n)
    }

    /// Async counterpart of [`BatchConn::send_batch`](crate::BatchConn::send_batch).
    pub async fn send_batch(&self, messages: &mut [Message<'_>], flags: i32) -> Result<usize> {
        let mut headers = self.pool.borrow();
        if messages.is_empty() {
            return Ok(0);
        }
        let codec = self.codec.as_deref();
        headers.pack(messages, None, codec)?;

        let submitted = messages.len();
        let mut retries = 0u32;
        let completed = loop {
            let mut guard = self.inner.writable().await.map_err(BatchError::Wait)?;
            let attempt = guard.try_io(|fd| {
                restarting(|| {
                    // SAFETY: as in `recv_batch`.
                    unsafe {
                        self.syscalls
                            .send_mmsg(fd.as_raw_fd(), headers.headers_mut(), flags)
                    }
                })
            });
            match attempt {
                Ok(Ok(n)) => break n,
                Ok(Err(source)) => return Err(BatchError::Syscall { op: SENDMMSG, source }),
                Err(_would_block) => retries += 1,
            }
        };
        if retries > 0 {
            trace!(op = SENDMMSG, retries, "batch completed after waiting for readiness");
        }
        let n = check_completed(SENDMMSG, completed, submitted)?;

        headers.truncate(n);
        headers.unpack(&mut messages[..n], None, self.network)?;
        Ok(n)
    }
}

impl<S> std::fmt::Debug for AsyncBatchConn<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBatchConn")
            .field("socket", self.inner.get_ref())
            .field("network", &self.network)
            .field("resolve_addresses", &self.codec.is_some())
            .field("batch_size", &self.pool.batch_size())
            .finish()
    }
}

/// Restart `f` while it fails with `EINTR`.
fn restarting<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
