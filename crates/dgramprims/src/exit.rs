use std::fmt;
use std::io;

use dgramprims_batch::BatchError;
use dgramprims_transport::TransportError;

// Exit codes follow the sysexits-flavored convention used across our CLIs.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint { .. } | TransportError::Address(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn batch_error(context: &str, err: BatchError) -> CliError {
    match err {
        BatchError::Wait(source) => io_error(context, source),
        BatchError::Syscall { op, source } => {
            let code = match source.kind() {
                io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
                _ => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("{context}: {op}: {source}"))
        }
        BatchError::BatchTooLarge { .. } | BatchError::Encoding { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        BatchError::Decoding { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_maps_to_timeout_code() {
        let err = batch_error(
            "receive failed",
            BatchError::Wait(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")),
        );
        assert_eq!(err.code, TIMEOUT);
        assert_eq!(err.message, "receive failed: i/o timeout");
    }

    #[test]
    fn syscall_errors_keep_the_operation_name() {
        let err = batch_error(
            "send failed",
            BatchError::Syscall {
                op: "sendmmsg",
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("send failed: sendmmsg: "));
    }

    #[test]
    fn capacity_errors_are_usage_errors() {
        let err = batch_error("send failed", BatchError::BatchTooLarge { len: 9, max: 8 });
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn invalid_endpoint_is_usage_error() {
        let err = transport_error(
            "invalid target",
            TransportError::InvalidEndpoint {
                input: "tcp://x".to_string(),
                reason: "unsupported".to_string(),
            },
        );
        assert_eq!(err.code, USAGE);
    }
}
