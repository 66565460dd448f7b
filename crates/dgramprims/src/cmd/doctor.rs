use serde::Serialize;

use crate::cmd::envinfo::active_features;
use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        platform_batch_check(),
        loopback_round_trip_check(),
        temp_dir_writable_check(),
        batch_size_env_check(std::env::var("DGRAMPRIMS_BATCH_SIZE").ok().as_deref()),
        CheckResult::new(
            "compiled_features",
            CheckStatus::Info,
            active_features().join(", "),
        ),
    ];

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        schema_id: "https://schemas.3leaps.dev/dgramprims/cli/v1/doctor-report.schema.json",
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("dgramprims doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_batch_check() -> CheckResult {
    if cfg!(any(target_os = "linux", target_os = "android")) {
        CheckResult::new(
            "platform_batch",
            CheckStatus::Pass,
            "recvmmsg/sendmmsg available",
        )
    } else {
        CheckResult::new(
            "platform_batch",
            CheckStatus::Fail,
            format!("recvmmsg/sendmmsg unavailable on {}", std::env::consts::OS),
        )
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn loopback_round_trip_check() -> CheckResult {
    const NAME: &str = "udp_loopback_batch";
    match loopback_round_trip(4) {
        Ok(received) => CheckResult::new(
            NAME,
            CheckStatus::Pass,
            format!("{received} datagrams sent and received in one batch each"),
        ),
        Err(err) => CheckResult::new(NAME, CheckStatus::Fail, err),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn loopback_round_trip_check() -> CheckResult {
    CheckResult::new(
        "udp_loopback_batch",
        CheckStatus::Skip,
        "batch syscalls not available on this platform",
    )
}

/// Send `count` datagrams over 127.0.0.1 with one `sendmmsg` and read them
/// back with `recvmmsg`, checking payloads and sender addresses.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn loopback_round_trip(count: u8) -> Result<usize, String> {
    use std::time::Duration;

    use dgramprims_batch::{BatchConn, Message};
    use dgramprims_transport::DatagramSocket;

    let loopback = "127.0.0.1:0".parse().map_err(|err| format!("{err}"))?;
    let rx_sock = DatagramSocket::bind_udp(loopback).map_err(|err| format!("bind failed: {err}"))?;
    rx_sock
        .set_read_timeout(Some(Duration::from_secs(1)))
        .map_err(|err| err.to_string())?;
    let tx_sock = DatagramSocket::bind_udp(loopback).map_err(|err| format!("bind failed: {err}"))?;
    let rx_addr = rx_sock.local_addr().map_err(|err| err.to_string())?;
    let tx_addr = tx_sock.local_addr().map_err(|err| err.to_string())?;
    let rx = BatchConn::from_socket(rx_sock);
    let tx = BatchConn::from_socket(tx_sock);

    let mut payloads: Vec<[u8; 1]> = (0..count).map(|i| [i]).collect();
    let mut out: Vec<Message<'_>> = payloads
        .iter_mut()
        .map(|p| Message::new(&mut p[..]).with_addr(rx_addr.clone()))
        .collect();
    let sent = tx
        .send_batch(&mut out, 0)
        .map_err(|err| format!("send failed: {err}"))?;
    if sent != out.len() {
        return Err(format!("sendmmsg sent {sent} of {}", out.len()));
    }

    let mut bufs = vec![[0u8; 8]; usize::from(count)];
    let mut inbox: Vec<Message<'_>> = bufs.iter_mut().map(|b| Message::new(&mut b[..])).collect();
    let mut received = 0;
    while received < inbox.len() {
        received += rx
            .recv_batch(&mut inbox[received..], 0)
            .map_err(|err| format!("receive failed: {err}"))?;
    }

    for (i, msg) in inbox.iter().enumerate() {
        if msg.to_vec() != [i as u8] {
            return Err(format!("datagram {i} arrived out of order"));
        }
        if msg.addr.as_ref() != Some(&tx_addr) {
            return Err(format!("datagram {i} reported the wrong sender"));
        }
    }
    Ok(received)
}

#[cfg(unix)]
fn temp_dir_writable_check() -> CheckResult {
    use dgramprims_transport::DatagramSocket;

    const NAME: &str = "temp_dir_writable";
    let dir = std::path::PathBuf::from(format!(
        "/tmp/dgramprims-doctor-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    let _ = std::fs::create_dir_all(&dir);
    let outcome = match DatagramSocket::bind_unixgram(dir.join("doctor.sock")) {
        Ok(socket) => {
            drop(socket);
            CheckResult::new(NAME, CheckStatus::Pass, "/tmp unixgram bind succeeded")
        }
        Err(err) => CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("/tmp unixgram bind failed: {err}"),
        ),
    };
    let _ = std::fs::remove_dir_all(&dir);
    outcome
}

#[cfg(not(unix))]
fn temp_dir_writable_check() -> CheckResult {
    CheckResult::new(
        "temp_dir_writable",
        CheckStatus::Skip,
        "unixgram sockets not available on this platform",
    )
}

fn batch_size_env_check(value: Option<&str>) -> CheckResult {
    const NAME: &str = "batch_size_env";
    match value {
        None => CheckResult::new(NAME, CheckStatus::Skip, "DGRAMPRIMS_BATCH_SIZE not set"),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => {
                CheckResult::new(NAME, CheckStatus::Pass, format!("batch size {size}"))
            }
            _ => CheckResult::new(
                NAME,
                CheckStatus::Fail,
                format!("DGRAMPRIMS_BATCH_SIZE={raw:?} is not a positive integer"),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_output_has_overall_status() {
        let output = DoctorOutput {
            schema_id: "x",
            checks: vec![CheckResult::new("x", CheckStatus::Pass, "ok")],
            overall: "pass",
        };
        let json = serde_json::to_string(&output).expect("doctor output should serialize");
        assert!(json.contains("\"overall\":\"pass\""));
    }

    #[test]
    fn batch_size_env_is_validated() {
        assert_eq!(batch_size_env_check(None).status, CheckStatus::Skip);
        assert_eq!(batch_size_env_check(Some("64")).status, CheckStatus::Pass);
        assert_eq!(batch_size_env_check(Some("0")).status, CheckStatus::Fail);
        assert_eq!(batch_size_env_check(Some("many")).status, CheckStatus::Fail);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn loopback_round_trip_passes() {
        assert_eq!(loopback_round_trip(4), Ok(4));
    }
}
