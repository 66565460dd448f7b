use dgramprims_transport::AddrError;

/// Errors that can occur in batch operations.
///
/// A would-block condition is never reported: it is absorbed by the
/// readiness-retry loop.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// More messages were submitted than a header array holds. Nothing was sent
    /// or received; split the batch and resubmit.
    #[error("batch of {len} messages exceeds header capacity {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A destination address could not be encoded.
    #[error("failed to encode address of message {index}: {source}")]
    Encoding { index: usize, source: AddrError },

    /// A kernel-reported peer address could not be decoded.
    ///
    /// The syscall still transferred `completed` messages. Each of them has
    /// `n`, `nn` and `flags` set, and every one except `index` (or a later
    /// message that also failed) has its `addr`.
    #[error("failed to decode address of message {index} of {completed}: {source}")]
    Decoding {
        index: usize,
        completed: usize,
        source: AddrError,
    },

    /// The batched syscall failed.
    #[error("{op}: {source}")]
    Syscall {
        op: &'static str,
        source: std::io::Error,
    },

    /// Waiting for readiness failed (timeout, closed descriptor).
    #[error("readiness wait failed: {0}")]
    Wait(std::io::Error),

    /// The kernel reported more completed messages than were submitted.
    #[error("{op} reported {completed} completed messages for a batch of {submitted}")]
    Overrun {
        op: &'static str,
        completed: usize,
        submitted: usize,
    },
}

impl BatchError {
    /// Messages the kernel transferred before this error was raised.
    pub fn completed(&self) -> usize {
        match self {
            BatchError::Decoding { completed, .. } => *completed,
            _ => 0,
        }
    }

    /// The OS error code behind a syscall or wait failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            BatchError::Syscall { source, .. } | BatchError::Wait(source) => {
                source.raw_os_error()
            }
            _ => None,
        }
    }

    /// Whether the operation gave up because its readiness wait timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BatchError::Wait(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
