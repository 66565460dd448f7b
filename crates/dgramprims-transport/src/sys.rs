use std::io;
use std::os::fd::RawFd;

/// The batched receive/send primitive.
///
/// Implementations make exactly one attempt per call. A would-block condition
/// is returned as an `io::Error` of kind `WouldBlock`; retrying is the
/// caller's job.
///
/// # Safety
///
/// Implementations may hand `headers` to the kernel, which writes through the
/// pointers stored in them. Implementors must not read or write through those
/// pointers beyond what `recvmmsg(2)` / `sendmmsg(2)` would.
pub unsafe trait BatchSyscall {
    /// Receive into `headers`, returning how many entries the kernel filled.
    ///
    /// # Safety
    ///
    /// Every `msg_iov`, `msg_control` and `msg_name` pointer in `headers` must
    /// be null or point at live memory, writable for the length recorded next
    /// to it, for the duration of the call.
    unsafe fn recv_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize>;

    /// Send `headers`, returning how many entries the kernel consumed.
    ///
    /// # Safety
    ///
    /// Every pointer in `headers` must be null or point at live, readable
    /// memory of the recorded length for the duration of the call.
    unsafe fn send_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize>;
}

// SAFETY: forwards to `T` with the caller's guarantees unchanged.
unsafe impl<T: BatchSyscall + ?Sized> BatchSyscall for &T {
    unsafe fn recv_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize> {
        (**self).recv_mmsg(fd, headers, flags)
    }

    unsafe fn send_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize> {
        (**self).send_mmsg(fd, headers, flags)
    }
}

/// `recvmmsg(2)` / `sendmmsg(2)` through libc.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mmsg;

// SAFETY: only the kernel touches the header pointers.
unsafe impl BatchSyscall for Mmsg {
    unsafe fn recv_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize> {
        // SAFETY: `headers` is a valid, writable slice of `mmsghdr` and its length
        // is passed alongside. The caller guarantees the buffers the headers point
        // at are live. A null timeout means no recvmmsg timeout.
        let rc = unsafe {
            libc::recvmmsg(
                fd,
                headers.as_mut_ptr(),
                headers.len() as _,
                flags as _,
                std::ptr::null_mut(),
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }

    unsafe fn send_mmsg(
        &self,
        fd: RawFd,
        headers: &mut [libc::mmsghdr],
        flags: i32,
    ) -> io::Result<usize> {
        // SAFETY: as for `recv_mmsg`; the kernel only writes `msg_len`.
        let rc = unsafe {
            libc::sendmmsg(fd, headers.as_mut_ptr(), headers.len() as _, flags as _)
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }
}
