use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use dgramprims_transport::{
    AddressCodec, BatchSyscall, DatagramSocket, Mmsg, Network, RawConn, SockaddrCodec,
};
use tracing::trace;

use crate::config::{BatchConfig, DEFAULT_BATCH_SIZE};
use crate::error::{BatchError, Result};
use crate::message::Message;
use crate::pool::HeaderPool;

pub(crate) const RECVMMSG: &str = "recvmmsg";
pub(crate) const SENDMMSG: &str = "sendmmsg";

/// Batched receive and send over a socket's readiness-retry facility.
///
/// Safe to share across threads when `C` and `S` are: every call borrows its
/// own header array from the shared pool.
pub struct BatchConn<C, S = Mmsg> {
    conn: C,
    syscalls: S,
    network: Network,
    codec: Option<Arc<dyn AddressCodec>>,
    pool: Arc<HeaderPool>,
}

impl<C: RawConn> BatchConn<C> {
    /// Wrap `conn` with default settings: the global pool of
    /// [`DEFAULT_BATCH_SIZE`] arrays, and address resolution for
    /// connectionless networks.
    pub fn new(conn: C, network: Network) -> Self {
        Self::with_config(conn, network, &BatchConfig::default())
    }

    /// Wrap `conn` using `config`. The default batch size shares the global
    /// pool; any other size gets a pool of its own.
    ///
    /// # Panics
    /// Panics if `config.batch_size` is 0.
    pub fn with_config(conn: C, network: Network, config: &BatchConfig) -> Self {
        Self {
            conn,
            syscalls: Mmsg,
            network,
            codec: default_codec(network, config),
            pool: pool_for(config),
        }
    }
}

impl BatchConn<DatagramSocket> {
    /// Wrap a socket, taking the network from it.
    pub fn from_socket(socket: DatagramSocket) -> Self {
        let network = socket.network();
        Self::new(socket, network)
    }
}

impl<C: RawConn, S: BatchSyscall> BatchConn<C, S> {
    /// Share a specific header pool. Its batch size becomes this
    /// connection's batch size.
    pub fn with_pool(mut self, pool: Arc<HeaderPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Replace the address codec. `None` disables address handling.
    pub fn with_address_codec(mut self, codec: Option<Arc<dyn AddressCodec>>) -> Self {
        self.codec = codec;
        self
    }

    /// Swap the syscall layer.
    pub fn with_syscalls<T: BatchSyscall>(self, syscalls: T) -> BatchConn<C, T> {
        BatchConn {
            conn: self.conn,
            syscalls,
            network: self.network,
            codec: self.codec,
            pool: self.pool,
        }
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Maximum messages accepted by one call.
    pub fn batch_size(&self) -> usize {
        self.pool.batch_size()
    }

    pub fn pool(&self) -> &Arc<HeaderPool> {
        &self.pool
    }

    /// Receive up to `messages.len()` datagrams in one `recvmmsg(2)` call.
    ///
    /// Returns the number of filled messages, always at most
    /// `messages.len()`. For each of them `n`, `nn` and `flags` are set, and
    /// on connectionless networks `addr` holds the sender. Messages past the
    /// returned count are untouched. Blocks (through the readiness facility)
    /// until at least one datagram is available.
    pub fn recv_batch(&self, messages: &mut [Message<'_>], flags: i32) -> Result<usize> {
        let mut headers = self.pool.borrow();
        if messages.is_empty() {
            return Ok(0);
        }
        let codec = self.codec.as_deref();
        headers.pack(messages, codec, None)?;

        let submitted = messages.len();
        let n = drive(
            RECVMMSG,
            submitted,
            |f| self.conn.read(f),
            |fd| {
                // SAFETY: `pack` pointed every header at `messages`, which
                // outlive this call.
                unsafe { self.syscalls.recv_mmsg(fd, headers.headers_mut(), flags) }
            },
        )?;

        headers.truncate(n);
        headers.unpack(&mut messages[..n], codec, self.network)?;
        Ok(n)
    }

    /// Send up to `messages.len()` datagrams in one `sendmmsg(2)` call.
    ///
    /// On connectionless networks each message's `addr` is its destination.
    /// Returns the number of messages sent; for each of them `n` is the byte
    /// count. A short count is a partial completion: resubmit the suffix.
    pub fn send_batch(&self, messages: &mut [Message<'_>], flags: i32) -> Result<usize> {
        let mut headers = self.pool.borrow();
        if messages.is_empty() {
            return Ok(0);
        }
        let codec = self.codec.as_deref();
        headers.pack(messages, None, codec)?;

        let submitted = messages.len();
        let n = drive(
            SENDMMSG,
            submitted,
            |f| self.conn.write(f),
            |fd| {
                // SAFETY: as in `recv_batch`.
                unsafe { self.syscalls.send_mmsg(fd, headers.headers_mut(), flags) }
            },
        )?;

        headers.truncate(n);
        headers.unpack(&mut messages[..n], None, self.network)?;
        Ok(n)
    }
}

impl<C: std::fmt::Debug, S> std::fmt::Debug for BatchConn<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConn")
            .field("conn", &self.conn)
            .field("network", &self.network)
            .field("resolve_addresses", &self.codec.is_some())
            .field("batch_size", &self.pool.batch_size())
            .finish()
    }
}

pub(crate) fn default_codec(
    network: Network,
    config: &BatchConfig,
) -> Option<Arc<dyn AddressCodec>> {
    if config.resolve_addresses && network.is_connectionless() {
        Some(Arc::new(SockaddrCodec::for_network(network)))
    } else {
        None
    }
}

/// The global pool for [`DEFAULT_BATCH_SIZE`], otherwise a private pool.
///
/// # Panics
/// Panics if `config.batch_size` is 0.
pub(crate) fn pool_for(config: &BatchConfig) -> Arc<HeaderPool> {
    if config.batch_size == DEFAULT_BATCH_SIZE {
        HeaderPool::global()
    } else {
        Arc::new(HeaderPool::new(config.batch_size))
    }
}

/// Outcome of the syscall closure as seen by the readiness facility.
enum Attempt {
    Waiting,
    Completed(io::Result<usize>),
}

/// Would-block and interrupted calls are retried; everything else is final.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// Run `call` under the readiness facility `wait` until it completes.
fn drive(
    op: &'static str,
    submitted: usize,
    wait: impl FnOnce(&mut dyn FnMut(RawFd) -> bool) -> io::Result<()>,
    mut call: impl FnMut(RawFd) -> io::Result<usize>,
) -> Result<usize> {
    let mut state = Attempt::Waiting;
    let mut retries = 0u32;
    wait(&mut |fd| match call(fd) {
        Err(err) if is_transient(&err) => {
            retries += 1;
            false
        }
        result => {
            state = Attempt::Completed(result);
            true
        }
    })
    .map_err(BatchError::Wait)?;

    if retries > 0 {
        trace!(op, retries, "batch completed after waiting for readiness");
    }
    match state {
        Attempt::Waiting => Err(BatchError::Wait(io::Error::other(
            "readiness facility returned before the operation completed",
        ))),
        Attempt::Completed(Err(source)) => Err(BatchError::Syscall { op, source }),
        Attempt::Completed(Ok(completed)) => check_completed(op, completed, submitted),
    }
}

pub(crate) fn check_completed(
    op: &'static str,
    completed: usize,
    submitted: usize,
) -> Result<usize> {
    if completed > submitted {
        return Err(BatchError::Overrun {
            op,
            completed,
            submitted,
        });
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgramprims_transport::SocketAddress;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    const FAKE_FD: RawFd = 42;

    /// Readiness facility that retries up to `max_waits` times, then fails
    /// with a timeout.
    struct FakeConn {
        max_waits: usize,
        waits: Cell<usize>,
    }

    impl FakeConn {
        fn new() -> Self {
            Self::with_max_waits(16)
        }

        fn with_max_waits(max_waits: usize) -> Self {
            Self {
                max_waits,
                waits: Cell::new(0),
            }
        }

        fn run(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
            loop {
                if f(FAKE_FD) {
                    return Ok(());
                }
                if self.waits.get() == self.max_waits {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"));
                }
                self.waits.set(self.waits.get() + 1);
            }
        }
    }

    impl RawConn for FakeConn {
        fn read(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
            self.run(f)
        }

        fn write(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
            self.run(f)
        }
    }

    enum Step {
        WouldBlock,
        Interrupted,
        Fail(i32),
        /// Fill the first headers with these (length, source) results.
        Complete(Vec<(u32, Option<SocketAddress>)>),
        /// As `Complete`, then clobber the address family of one header.
        Garble(Vec<(u32, Option<SocketAddress>)>, usize),
        /// Report a count without touching headers.
        Report(usize),
        Panic,
    }

    #[derive(Default)]
    struct Scripted {
        steps: RefCell<VecDeque<Step>>,
        calls: Cell<usize>,
        /// (header count, flags, destinations) seen on each send.
        sent: RefCell<Vec<(usize, i32, Vec<Option<SocketAddress>>)>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: RefCell::new(steps.into()),
                ..Self::default()
            }
        }

        fn step(&self, headers: &mut [libc::mmsghdr]) -> io::Result<usize> {
            self.calls.set(self.calls.get() + 1);
            let step = self.steps.borrow_mut().pop_front().expect("script exhausted");
            match step {
                Step::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
                Step::Interrupted => Err(io::ErrorKind::Interrupted.into()),
                Step::Fail(errno) => Err(io::Error::from_raw_os_error(errno)),
                Step::Report(n) => Ok(n),
                Step::Panic => panic!("syscall exploded"),
                Step::Complete(results) => Ok(complete(headers, &results)),
                Step::Garble(results, index) => {
                    let n = complete(headers, &results);
                    let name = headers[index].msg_hdr.msg_name.cast::<libc::sockaddr_storage>();
                    // SAFETY: `complete` checked that msg_name is reserved.
                    unsafe { (*name).ss_family = libc::AF_UNSPEC as libc::sa_family_t };
                    Ok(n)
                }
            }
        }
    }

    fn complete(headers: &mut [libc::mmsghdr], results: &[(u32, Option<SocketAddress>)]) -> usize {
        let codec = SockaddrCodec::new();
        for (header, (len, peer)) in headers.iter_mut().zip(results) {
            header.msg_len = *len;
            if let Some(peer) = peer {
                let name = header.msg_hdr.msg_name.cast::<libc::sockaddr_storage>();
                assert!(!name.is_null(), "no address buffer reserved");
                // SAFETY: pack points msg_name at a sockaddr_storage.
                let name = unsafe { &mut *name };
                header.msg_hdr.msg_namelen = codec.encode(peer, name).unwrap();
            }
        }
        results.len()
    }

    unsafe impl BatchSyscall for Scripted {
        unsafe fn recv_mmsg(
            &self,
            fd: RawFd,
            headers: &mut [libc::mmsghdr],
            _flags: i32,
        ) -> io::Result<usize> {
            assert_eq!(fd, FAKE_FD);
            self.step(headers)
        }

        unsafe fn send_mmsg(
            &self,
            fd: RawFd,
            headers: &mut [libc::mmsghdr],
            flags: i32,
        ) -> io::Result<usize> {
            assert_eq!(fd, FAKE_FD);
            let codec = SockaddrCodec::new();
            let destinations = headers
                .iter()
                .map(|h| {
                    let name = h.msg_hdr.msg_name.cast::<libc::sockaddr_storage>();
                    if name.is_null() {
                        return None;
                    }
                    // SAFETY: pack points msg_name at a sockaddr_storage.
                    let name = unsafe { &*name };
                    codec.decode(name, h.msg_hdr.msg_namelen, Network::Udp).ok()
                })
                .collect();
            self.sent.borrow_mut().push((headers.len(), flags, destinations));
            self.step(headers)
        }
    }

    fn peer(s: &str) -> SocketAddress {
        SocketAddress::Inet(s.parse::<SocketAddr>().unwrap())
    }

    fn conn(
        network: Network,
        pool: &Arc<HeaderPool>,
        steps: Vec<Step>,
    ) -> BatchConn<FakeConn, Scripted> {
        BatchConn::new(FakeConn::new(), network)
            .with_pool(Arc::clone(pool))
            .with_syscalls(Scripted::new(steps))
    }

    fn assert_pool_settled(pool: &HeaderPool) {
        assert_eq!(pool.idle(), pool.allocated(), "header array leaked");
    }

    #[test]
    fn recv_fills_lengths_and_peers() {
        let pool = Arc::new(HeaderPool::new(8));
        let a = peer("10.1.1.1:500");
        let b = peer("10.1.1.2:501");
        let batch = conn(
            Network::Udp4,
            &pool,
            vec![Step::Complete(vec![(5, Some(a.clone())), (9, Some(b.clone()))])],
        );

        let mut bufs = vec![[0u8; 32]; 4];
        let mut msgs: Vec<_> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
        let n = batch.recv_batch(&mut msgs, 0).unwrap();

        assert_eq!(n, 2);
        assert_eq!((msgs[0].n, msgs[0].addr.as_ref()), (5, Some(&a)));
        assert_eq!((msgs[1].n, msgs[1].addr.as_ref()), (9, Some(&b)));
        assert_eq!(msgs[2].n, 0);
        assert!(msgs[2].addr.is_none());
        assert_pool_settled(&pool);
    }

    #[test]
    fn would_block_is_transparent() {
        let pool = Arc::new(HeaderPool::new(4));
        let results = vec![(3, Some(peer("127.0.0.1:9")))];
        let batch = conn(
            Network::Udp,
            &pool,
            vec![
                Step::WouldBlock,
                Step::Interrupted,
                Step::WouldBlock,
                Step::Complete(results),
            ],
        );

        let mut buf = [0u8; 8];
        let mut msgs = vec![Message::new(&mut buf)];
        assert_eq!(batch.recv_batch(&mut msgs, 0).unwrap(), 1);
        assert_eq!(msgs[0].n, 3);
        assert_eq!(batch.get_ref().waits.get(), 3);
        assert_eq!(batch.syscalls.calls.get(), 4);
        assert_pool_settled(&pool);
    }

    #[test]
    fn send_would_block_is_transparent() {
        let run = |steps: Vec<Step>| {
            let pool = Arc::new(HeaderPool::new(4));
            let batch = conn(Network::Udp, &pool, steps);
            let mut p1 = *b"abc";
            let mut p2 = *b"defgh";
            let mut msgs = vec![
                Message::new(&mut p1).with_addr(peer("10.0.0.1:7")),
                Message::new(&mut p2).with_addr(peer("10.0.0.2:8")),
            ];
            let n = batch.send_batch(&mut msgs, libc::MSG_DONTWAIT).unwrap();
            assert_pool_settled(&pool);
            let lengths: Vec<_> = msgs.iter().map(|m| m.n).collect();
            let sent = batch.syscalls.sent.borrow().last().cloned().unwrap();
            (n, lengths, sent, batch.get_ref().waits.get())
        };
        let done = || Step::Complete(vec![(3, None), (5, None)]);

        let immediate = run(vec![done()]);
        let waited = run(vec![
            Step::WouldBlock,
            Step::Interrupted,
            Step::WouldBlock,
            done(),
        ]);

        assert_eq!(immediate.3, 0);
        assert_eq!(waited.3, 3);
        assert_eq!(immediate.0, 2);
        assert_eq!(waited.0, immediate.0);
        assert_eq!(waited.1, immediate.1);
        assert_eq!(waited.2, immediate.2);
        assert_eq!(
            waited.2,
            (
                2,
                libc::MSG_DONTWAIT,
                vec![Some(peer("10.0.0.1:7")), Some(peer("10.0.0.2:8"))]
            )
        );
    }

    #[test]
    fn recv_keeps_completed_count_when_a_peer_fails_to_decode() {
        let pool = Arc::new(HeaderPool::new(4));
        let from = peer("10.9.9.9:53");
        let results = vec![
            (4, Some(from.clone())),
            (5, Some(from.clone())),
            (6, Some(from.clone())),
        ];
        let batch = conn(Network::Udp4, &pool, vec![Step::Garble(results, 1)]);

        let mut bufs = vec![[0u8; 16]; 4];
        let mut msgs: Vec<_> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
        let err = batch.recv_batch(&mut msgs, 0).unwrap_err();

        assert!(matches!(
            err,
            BatchError::Decoding {
                index: 1,
                completed: 3,
                ..
            }
        ));
        assert_eq!(err.completed(), 3);
        let lengths: Vec<_> = msgs.iter().map(|m| m.n).collect();
        assert_eq!(lengths, [4, 5, 6, 0]);
        assert_eq!(msgs[0].addr.as_ref(), Some(&from));
        assert!(msgs[1].addr.is_none());
        assert_eq!(msgs[2].addr.as_ref(), Some(&from));
        assert_pool_settled(&pool);
    }

    #[test]
    #[should_panic(expected = "batch_size must be > 0")]
    fn zero_batch_size_panics() {
        let config = BatchConfig {
            batch_size: 0,
            ..BatchConfig::default()
        };
        let _ = BatchConn::with_config(FakeConn::new(), Network::Udp, &config);
    }

    #[test]
    fn syscall_failure_names_the_operation() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Udp, &pool, vec![Step::Fail(libc::ECONNREFUSED)]);

        let mut buf = [0u8; 8];
        let mut msgs = vec![Message::new(&mut buf).with_addr(peer("127.0.0.1:9"))];
        let err = batch.send_batch(&mut msgs, 0).unwrap_err();

        match &err {
            BatchError::Syscall { op, source } => {
                assert_eq!(*op, "sendmmsg");
                assert_eq!(source.raw_os_error(), Some(libc::ECONNREFUSED));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(msgs[0].n, 0);
        assert_pool_settled(&pool);

        let batch = conn(Network::Udp, &pool, vec![Step::Fail(libc::EBADF)]);
        let err = batch.recv_batch(&mut msgs, 0).unwrap_err();
        assert!(matches!(err, BatchError::Syscall { op: "recvmmsg", .. }));
    }

    #[test]
    fn wait_failure_is_reported_and_releases_headers() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = BatchConn::new(FakeConn::with_max_waits(2), Network::Udp)
            .with_pool(Arc::clone(&pool))
            .with_syscalls(Scripted::new(vec![
                Step::WouldBlock,
                Step::WouldBlock,
                Step::WouldBlock,
            ]));

        let mut buf = [0u8; 8];
        let mut msgs = vec![Message::new(&mut buf)];
        let err = batch.recv_batch(&mut msgs, 0).unwrap_err();
        assert!(err.is_timeout());
        assert_pool_settled(&pool);
    }

    #[test]
    fn empty_batch_skips_the_syscall() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Udp, &pool, Vec::new());

        assert_eq!(batch.recv_batch(&mut [], 0).unwrap(), 0);
        assert_eq!(batch.send_batch(&mut [], 0).unwrap(), 0);
        assert_eq!(batch.syscalls.calls.get(), 0);
        assert_pool_settled(&pool);
    }

    #[test]
    fn oversize_batch_is_rejected_before_the_syscall() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Udp, &pool, Vec::new());
        assert_eq!(batch.batch_size(), 4);

        let mut bufs = vec![[0u8; 4]; 6];
        let mut msgs: Vec<_> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
        let err = batch.send_batch(&mut msgs, 0).unwrap_err();

        assert!(matches!(err, BatchError::BatchTooLarge { len: 6, max: 4 }));
        assert_eq!(batch.syscalls.calls.get(), 0);
        assert_pool_settled(&pool);
    }

    #[test]
    fn partial_send_reports_prefix() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(
            Network::Udp,
            &pool,
            vec![Step::Complete(vec![(4, None), (2, None)])],
        );

        let mut a = *b"aaaa";
        let mut b = *b"bb";
        let mut c = *b"c";
        let dst = peer("127.0.0.1:7000");
        let mut msgs = vec![
            Message::new(&mut a).with_addr(dst.clone()),
            Message::new(&mut b).with_addr(dst.clone()),
            Message::new(&mut c),
        ];
        let n = batch.send_batch(&mut msgs, libc::MSG_DONTWAIT).unwrap();

        assert_eq!(n, 2);
        assert_eq!((msgs[0].n, msgs[1].n, msgs[2].n), (4, 2, 0));
        let sent = batch.syscalls.sent.borrow();
        let (count, flags, destinations) = &sent[0];
        assert_eq!(*count, 3);
        assert_eq!(*flags, libc::MSG_DONTWAIT);
        assert_eq!(destinations, &vec![Some(dst.clone()), Some(dst), None]);
    }

    #[test]
    fn overrun_is_an_error() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Udp, &pool, vec![Step::Report(3)]);

        let mut bufs = vec![[0u8; 4]; 2];
        let mut msgs: Vec<_> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
        let err = batch.recv_batch(&mut msgs, 0).unwrap_err();
        assert!(matches!(
            err,
            BatchError::Overrun {
                op: "recvmmsg",
                completed: 3,
                submitted: 2
            }
        ));
        assert_pool_settled(&pool);
    }

    #[test]
    fn stream_networks_never_resolve_addresses() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Tcp, &pool, vec![Step::Complete(vec![(6, None)])]);

        let mut buf = [0u8; 8];
        let mut msgs = vec![Message::new(&mut buf)];
        assert_eq!(batch.recv_batch(&mut msgs, 0).unwrap(), 1);
        assert_eq!(msgs[0].n, 6);
        assert!(msgs[0].addr.is_none());
    }

    #[test]
    fn disabled_resolution_skips_peer_decoding() {
        let pool = Arc::new(HeaderPool::new(4));
        let config = BatchConfig {
            batch_size: 4,
            resolve_addresses: false,
        };
        let batch = BatchConn::with_config(FakeConn::new(), Network::Udp, &config)
            .with_pool(Arc::clone(&pool))
            .with_syscalls(Scripted::new(vec![Step::Complete(vec![(2, None)])]));

        let mut buf = [0u8; 8];
        let mut msgs = vec![Message::new(&mut buf).with_addr(peer("127.0.0.1:1"))];
        assert_eq!(batch.send_batch(&mut msgs, 0).unwrap(), 1);
        let sent = batch.syscalls.sent.borrow();
        assert_eq!(sent[0].2, vec![None], "destination must not be encoded");
    }

    #[test]
    fn panicking_syscall_still_returns_headers() {
        let pool = Arc::new(HeaderPool::new(4));
        let batch = conn(Network::Udp, &pool, vec![Step::Panic]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut buf = [0u8; 8];
            let mut msgs = vec![Message::new(&mut buf)];
            let _ = batch.recv_batch(&mut msgs, 0);
        }));
        assert!(result.is_err());
        assert_pool_settled(&pool);
    }

    #[test]
    fn default_pool_is_shared() {
        let a = BatchConn::new(FakeConn::new(), Network::Udp);
        let b = BatchConn::new(FakeConn::new(), Network::Unixgram);
        assert!(Arc::ptr_eq(a.pool(), b.pool()));
        assert_eq!(a.batch_size(), DEFAULT_BATCH_SIZE);

        let config = BatchConfig {
            batch_size: 16,
            ..BatchConfig::default()
        };
        let c = BatchConn::with_config(FakeConn::new(), Network::Udp, &config);
        assert_eq!(c.batch_size(), 16);
    }
}
