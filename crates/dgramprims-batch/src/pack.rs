//! Translation between caller [`Message`]s and kernel `mmsghdr` records.

use std::mem;
use std::ptr;

use dgramprims_transport::{AddressCodec, Network};

use crate::error::{BatchError, Result};
use crate::message::Message;
use crate::pool::HeaderArray;

const NAME_CAPACITY: libc::socklen_t = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

impl HeaderArray {
    /// Describe `messages` in the first `messages.len()` headers and trim the
    /// array to that length.
    ///
    /// With a `decoder`, every header gets an address buffer for the kernel to
    /// fill on receive. With an `encoder`, messages carrying a destination have
    /// it encoded into their header; messages without one leave the name empty.
    pub(crate) fn pack(
        &mut self,
        messages: &mut [Message<'_>],
        decoder: Option<&dyn AddressCodec>,
        encoder: Option<&dyn AddressCodec>,
    ) -> Result<()> {
        if messages.len() > self.capacity() {
            return Err(BatchError::BatchTooLarge {
                len: messages.len(),
                max: self.capacity(),
            });
        }
        self.len = messages.len();
        self.packed = self.packed.max(messages.len());

        for (index, message) in messages.iter_mut().enumerate() {
            let iovecs = &mut self.iovecs[index];
            iovecs.clear();
            iovecs.extend(message.buffers.iter_mut().map(|buf| libc::iovec {
                iov_base: buf.as_mut_ptr().cast(),
                iov_len: buf.len(),
            }));

            let header = &mut self.headers[index];
            header.msg_len = 0;
            let hdr = &mut header.msg_hdr;
            hdr.msg_iov = if iovecs.is_empty() {
                ptr::null_mut()
            } else {
                iovecs.as_mut_ptr()
            };
            hdr.msg_iovlen = iovecs.len() as _;
            match message.oob.as_deref_mut() {
                Some(oob) if !oob.is_empty() => {
                    hdr.msg_control = oob.as_mut_ptr().cast();
                    hdr.msg_controllen = oob.len() as _;
                }
                _ => {
                    hdr.msg_control = ptr::null_mut();
                    hdr.msg_controllen = 0;
                }
            }
            hdr.msg_flags = message.flags;
            hdr.msg_name = ptr::null_mut();
            hdr.msg_namelen = 0;

            let name = &mut self.names[index];
            if decoder.is_some() {
                hdr.msg_name = (name as *mut libc::sockaddr_storage).cast();
                hdr.msg_namelen = NAME_CAPACITY;
            }
            if let (Some(encoder), Some(addr)) = (encoder, message.addr.as_ref()) {
                let len = encoder
                    .encode(addr, name)
                    .map_err(|source| BatchError::Encoding { index, source })?;
                hdr.msg_name = (name as *mut libc::sockaddr_storage).cast();
                hdr.msg_namelen = len;
            }
        }
        Ok(())
    }

    /// Copy kernel results from the in-use headers back into `messages`.
    ///
    /// Peer addresses are decoded only when a `decoder` is given and `network`
    /// is connectionless. Lengths and flags are copied for every in-use header
    /// even when an address fails to decode; the first failure is reported
    /// afterwards together with the completed count.
    pub(crate) fn unpack(
        &self,
        messages: &mut [Message<'_>],
        decoder: Option<&dyn AddressCodec>,
        network: Network,
    ) -> Result<()> {
        let decoder = decoder.filter(|_| network.is_connectionless());
        let mut failure = None;
        for (index, (header, message)) in
            self.headers().iter().zip(messages.iter_mut()).enumerate()
        {
            let hdr = &header.msg_hdr;
            message.n = header.msg_len as usize;
            message.nn = hdr.msg_controllen as usize;
            message.flags = hdr.msg_flags;

            let Some(decoder) = decoder else {
                continue;
            };
            if hdr.msg_name.is_null() {
                continue;
            }
            match decoder.decode(&self.names[index], hdr.msg_namelen, network) {
                Ok(addr) => message.addr = Some(addr),
                Err(source) => {
                    message.addr = None;
                    failure.get_or_insert((index, source));
                }
            }
        }
        match failure {
            Some((index, source)) => Err(BatchError::Decoding {
                index,
                completed: self.len().min(messages.len()),
                source,
            }),
            None => Ok(()),
        }
    }
}
