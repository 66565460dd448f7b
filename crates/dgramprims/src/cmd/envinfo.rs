use std::collections::BTreeMap;

use dgramprims_batch::DEFAULT_BATCH_SIZE;
use dgramprims_transport::DatagramSocket;
use serde::Serialize;

use crate::cmd::{parse_batch_size, EnvinfoArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

const BATCH_SIZE_ENV: &str = "DGRAMPRIMS_BATCH_SIZE";

#[derive(Serialize)]
struct PlatformInfo {
    os: &'static str,
    arch: &'static str,
    /// Both batch syscalls answered on this kernel.
    batch_syscalls: bool,
}

/// Outcome of a zero-length `recvmmsg`/`sendmmsg` on a socket pair: `ok`, or
/// the error the kernel returned.
#[derive(Serialize)]
struct SyscallSupport {
    recvmmsg: String,
    sendmmsg: String,
}

impl SyscallSupport {
    fn available(&self) -> bool {
        self.recvmmsg == "ok" && self.sendmmsg == "ok"
    }
}

#[derive(Serialize)]
struct BatchInfo {
    default_size: usize,
    effective_size: usize,
    size_source: String,
    /// Header and address storage pinned by one pooled array.
    header_array_bytes: Option<usize>,
}

#[derive(Serialize)]
struct SocketInfo {
    unix_path_max: usize,
    unix_socket_mode: String,
}

#[derive(Serialize)]
struct EnvInfoOutput {
    schema_id: &'static str,
    version: &'static str,
    target: String,
    platform: PlatformInfo,
    syscalls: Option<SyscallSupport>,
    batch: BatchInfo,
    sockets: SocketInfo,
    features: Vec<String>,
    environment: BTreeMap<&'static str, Option<String>>,
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let environment: BTreeMap<_, _> = [BATCH_SIZE_ENV, "RUST_LOG"]
        .into_iter()
        .map(|key| (key, std::env::var(key).ok()))
        .collect();
    let syscalls = syscall_support();

    let output = EnvInfoOutput {
        schema_id: "https://schemas.3leaps.dev/dgramprims/cli/v1/envinfo.schema.json",
        version: env!("CARGO_PKG_VERSION"),
        target: target_triple(),
        platform: PlatformInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            batch_syscalls: syscalls.as_ref().is_some_and(SyscallSupport::available),
        },
        syscalls,
        batch: batch_info(environment[BATCH_SIZE_ENV].as_deref()),
        sockets: SocketInfo {
            unix_path_max: DatagramSocket::MAX_PATH_LEN - 1,
            unix_socket_mode: format!("{:o}", DatagramSocket::DEFAULT_SOCKET_MODE),
        },
        features: active_features(),
        environment,
    };

    print_envinfo(&output, format);
    Ok(SUCCESS)
}

/// Issue both batch syscalls with no headers. The kernel returns 0 without
/// touching the socket when it implements them.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn syscall_support() -> Option<SyscallSupport> {
    use std::os::fd::AsRawFd;

    use dgramprims_transport::{BatchSyscall, Mmsg};

    let describe = |result: std::io::Result<usize>| match result {
        Ok(_) => "ok".to_string(),
        Err(err) => err.to_string(),
    };
    let (socket, _peer) = match DatagramSocket::unixgram_pair() {
        Ok(pair) => pair,
        Err(err) => {
            let failure = format!("socketpair failed: {err}");
            return Some(SyscallSupport {
                recvmmsg: failure.clone(),
                sendmmsg: failure,
            });
        }
    };
    let fd = socket.as_raw_fd();
    // SAFETY: empty header slices reference no caller memory.
    let (recv, send) = unsafe {
        (
            Mmsg.recv_mmsg(fd, &mut [], 0),
            Mmsg.send_mmsg(fd, &mut [], 0),
        )
    };
    Some(SyscallSupport {
        recvmmsg: describe(recv),
        sendmmsg: describe(send),
    })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn syscall_support() -> Option<SyscallSupport> {
    None
}

fn batch_info(env_value: Option<&str>) -> BatchInfo {
    let (effective_size, size_source) = match env_value.map(parse_batch_size) {
        None => (DEFAULT_BATCH_SIZE, "default".to_string()),
        Some(Ok(size)) => (size, BATCH_SIZE_ENV.to_string()),
        Some(Err(err)) => {
            let reason = format!("default ({BATCH_SIZE_ENV}: {err})");
            (DEFAULT_BATCH_SIZE, reason)
        }
    };
    BatchInfo {
        default_size: DEFAULT_BATCH_SIZE,
        effective_size,
        size_source,
        header_array_bytes: header_array_bytes(effective_size),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn header_array_bytes(batch_size: usize) -> Option<usize> {
    // A fresh pool allocates nothing until the first acquire.
    Some(dgramprims_batch::HeaderPool::new(batch_size).array_bytes())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn header_array_bytes(_batch_size: usize) -> Option<usize> {
    None
}

fn target_triple() -> String {
    if let Some(target) = option_env!("DGRAMPRIMS_BUILD_TARGET") {
        return target.to_string();
    }
    let (arch, os) = (std::env::consts::ARCH, std::env::consts::OS);
    match os {
        "linux" => format!("{arch}-unknown-linux-gnu"),
        "android" => format!("{arch}-linux-android"),
        "macos" => format!("{arch}-apple-darwin"),
        _ => format!("{arch}-unknown-{os}"),
    }
}

fn print_envinfo(output: &EnvInfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("dgramprims environment\n");
            println!("  Version:     {}", output.version);
            println!("  Target:      {}", output.target);
            println!(
                "  Platform:    {} ({})",
                output.platform.os, output.platform.arch
            );
            match &output.syscalls {
                Some(calls) => {
                    println!("  recvmmsg:    {}", calls.recvmmsg);
                    println!("  sendmmsg:    {}", calls.sendmmsg);
                }
                None => println!("  Syscalls:    recvmmsg/sendmmsg not built for this platform"),
            }
            println!(
                "  Batch size:  {} ({})",
                output.batch.effective_size, output.batch.size_source
            );
            if let Some(bytes) = output.batch.header_array_bytes {
                println!("  Array size:  {bytes} bytes per pooled header array");
            }
            println!(
                "  Unix paths:  up to {} bytes, mode {}",
                output.sockets.unix_path_max, output.sockets.unix_socket_mode
            );
            println!("  Features:    {}", output.features.join(", "));
            println!("\n  Environment:");
            for (k, v) in &output.environment {
                println!("    {:<22} {}", k, v.as_deref().unwrap_or("(not set)"));
            }
        }
        OutputFormat::Raw => println!("{}", output.version),
    }
}

pub(crate) fn active_features() -> Vec<String> {
    let mut features = Vec::new();
    if cfg!(feature = "async") {
        features.push("async".to_string());
    }
    if cfg!(feature = "cli") {
        features.push("cli".to_string());
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_batch_size_overrides_default() {
        let info = batch_info(Some("16"));
        assert_eq!(info.effective_size, 16);
        assert_eq!(info.size_source, BATCH_SIZE_ENV);

        let info = batch_info(None);
        assert_eq!(info.effective_size, DEFAULT_BATCH_SIZE);
        assert_eq!(info.size_source, "default");
    }

    #[test]
    fn invalid_env_batch_size_falls_back_with_reason() {
        let info = batch_info(Some("0"));
        assert_eq!(info.effective_size, DEFAULT_BATCH_SIZE);
        assert!(info.size_source.contains("greater than zero"), "{}", info.size_source);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn kernel_answers_both_batch_syscalls() {
        let support = syscall_support().expect("linux builds carry the batch syscalls");
        assert_eq!(support.recvmmsg, "ok");
        assert_eq!(support.sendmmsg, "ok");
        assert!(support.available());

        let info = batch_info(Some("4"));
        let per_slot = info.header_array_bytes.unwrap() / 4;
        assert_eq!(batch_info(Some("8")).header_array_bytes, Some(8 * per_slot));
    }

    #[test]
    fn unix_path_limit_excludes_terminator() {
        assert!(DatagramSocket::MAX_PATH_LEN >= 92);
        let json = serde_json::to_value(SocketInfo {
            unix_path_max: DatagramSocket::MAX_PATH_LEN - 1,
            unix_socket_mode: format!("{:o}", DatagramSocket::DEFAULT_SOCKET_MODE),
        })
        .expect("socket info should serialize");
        assert_eq!(json["unix_socket_mode"], "600");
    }

    #[test]
    fn target_looks_like_triple() {
        assert!(target_triple().split('-').count() >= 3);
    }
}
