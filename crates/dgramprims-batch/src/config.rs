/// Default number of messages per batched syscall (capacity of pooled header arrays).
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Controls batch engine behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum messages per syscall. Larger requests must be split by the caller.
    pub batch_size: usize,
    /// When true, connectionless sockets encode destination addresses on send
    /// and decode peer addresses on receive. Turning it off skips address
    /// handling entirely, which suits connected sockets.
    pub resolve_addresses: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            resolve_addresses: true,
        }
    }
}
