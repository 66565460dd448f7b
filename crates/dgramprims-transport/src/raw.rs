use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Readiness a caller waits for before retrying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn poll_events(self) -> libc::c_short {
        match self {
            Interest::Readable => libc::POLLIN,
            Interest::Writable => libc::POLLOUT,
        }
    }
}

/// Access to a socket's raw descriptor with readiness-driven retry.
///
/// `f` is invoked with the descriptor. Returning `true` ends the operation;
/// returning `false` means "would block", so the implementation waits until
/// the descriptor is readable (for [`RawConn::read`]) or writable (for
/// [`RawConn::write`]) and invokes `f` again. Timeouts and cancellation are
/// the implementation's concern and surface as the returned error.
pub trait RawConn {
    fn read(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()>;
    fn write(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()>;
}

impl<T: RawConn + ?Sized> RawConn for &T {
    fn read(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
        (**self).read(f)
    }

    fn write(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
        (**self).write(f)
    }
}

impl<T: RawConn + ?Sized> RawConn for std::sync::Arc<T> {
    fn read(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
        (**self).read(f)
    }

    fn write(&self, f: &mut dyn FnMut(RawFd) -> bool) -> io::Result<()> {
        (**self).write(f)
    }
}

/// Drive `f` on `fd` until it reports completion, waiting for `interest`
/// between attempts.
///
/// The optional `timeout` bounds the whole operation, not each wait.
pub fn retry_on_ready(
    fd: RawFd,
    interest: Interest,
    timeout: Option<Duration>,
    f: &mut dyn FnMut(RawFd) -> bool,
) -> io::Result<()> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if f(fd) {
            return Ok(());
        }
        wait_ready(fd, interest, deadline)?;
    }
}

/// Block until `fd` is ready for `interest` or `deadline` passes.
///
/// Error and hang-up conditions count as ready so the next syscall can report
/// them. Interrupted polls are restarted.
pub fn wait_ready(fd: RawFd, interest: Interest, deadline: Option<Instant>) -> io::Result<()> {
    loop {
        let timeout_ms = match deadline {
            None => -1,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"));
                }
                // Round up so a sub-millisecond remainder still sleeps.
                remaining
                    .as_micros()
                    .div_ceil(1000)
                    .min(libc::c_int::MAX as u128) as libc::c_int
            }
        };

        let mut pfd = libc::pollfd {
            fd,
            events: interest.poll_events(),
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of one.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            continue;
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        return Ok(());
    }
}
