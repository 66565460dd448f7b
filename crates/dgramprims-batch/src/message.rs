use dgramprims_transport::SocketAddress;

/// One datagram in a batch.
///
/// The caller owns every buffer for the duration of one batch call; the
/// engine only arranges references to them in the kernel header array.
#[derive(Debug, Default)]
pub struct Message<'a> {
    /// Payload buffers (scatter/gather). Each becomes one iovec.
    pub buffers: Vec<&'a mut [u8]>,
    /// Ancillary (control) data buffer.
    pub oob: Option<&'a mut [u8]>,
    /// Destination on send; peer on receive when addresses are resolved.
    pub addr: Option<SocketAddress>,
    /// Bytes transferred.
    pub n: usize,
    /// Control-data bytes received.
    pub nn: usize,
    /// Message flags: copied into the header, then replaced by the kernel's
    /// `msg_flags` (e.g. `MSG_TRUNC`, `MSG_CTRUNC`).
    pub flags: i32,
}

impl<'a> Message<'a> {
    /// A message backed by a single buffer.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self::with_buffers(vec![buf])
    }

    pub fn with_buffers(buffers: Vec<&'a mut [u8]>) -> Self {
        Self {
            buffers,
            ..Self::default()
        }
    }

    pub fn with_addr(mut self, addr: SocketAddress) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_oob(mut self, oob: &'a mut [u8]) -> Self {
        self.oob = Some(oob);
        self
    }

    /// Total capacity of the payload buffers.
    pub fn payload_len(&self) -> usize {
        self.buffers.iter().map(|b| b.len()).sum()
    }

    /// The datagram was larger than the payload buffers.
    pub fn is_truncated(&self) -> bool {
        self.flags & libc::MSG_TRUNC != 0
    }

    /// The control data did not fit the `oob` buffer.
    pub fn is_control_truncated(&self) -> bool {
        self.flags & libc::MSG_CTRUNC != 0
    }

    /// Copy of the first `n` transferred bytes, gathered across buffers.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.n);
        let mut remaining = self.n;
        for buf in &self.buffers {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(buf.len());
            out.extend_from_slice(&buf[..take]);
            remaining -= take;
        }
        out
    }

    /// Received control data (the first `nn` bytes of `oob`).
    pub fn control(&self) -> &[u8] {
        match &self.oob {
            Some(oob) => &oob[..self.nn.min(oob.len())],
            None => &[],
        }
    }
}
