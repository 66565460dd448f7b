#![cfg(all(any(target_os = "linux", target_os = "android"), feature = "cli"))]

use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/dgcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .expect("port finder socket should bind")
        .local_addr()
        .expect("port finder socket should have an address")
        .port()
}

fn dgramprims() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dgramprims"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn wait_for_path(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("{} never appeared", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Send to `target` until `child` exits, then collect its output.
fn send_until_exit(child: Child, target: &str, count: &str) -> Output {
    let mut child = child;
    let start = Instant::now();
    loop {
        if child.try_wait().expect("child status").is_some() {
            return child.wait_with_output().expect("child output");
        }
        if start.elapsed() >= Duration::from_secs(5) {
            let _ = child.kill();
            panic!("receiver did not exit");
        }
        let _ = dgramprims()
            .args(["send", target, "--data", "hello", "--count", count])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn recv_prints_udp_datagrams_as_json() {
    let target = format!("udp://127.0.0.1:{}", free_udp_port());
    let child = dgramprims()
        .args(["--format", "json", "recv", &target, "--count", "3", "--timeout", "5s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("recv should start");

    let output = send_until_exit(child, &target, "3");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        assert!(line["schema_id"]
            .as_str()
            .is_some_and(|id| id.ends_with("datagram-received.schema.json")));
        assert_eq!(line["size"], 5);
        assert!(line["peer"].as_str().is_some_and(|p| p.starts_with("127.0.0.1:")));
    }
}

#[test]
fn recv_on_unixgram_path_exits_after_count() {
    let dir = unique_temp_dir("recv-unix");
    let sock_path = dir.join("rx.sock");
    let target = format!("unixgram://{}", sock_path.display());

    let child = dgramprims()
        .args(["--format", "json", "recv", &target, "--count", "1", "--timeout", "5s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("recv should start");
    wait_for_path(&sock_path, Duration::from_secs(3));

    let output = send_until_exit(child, &target, "1");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("\"size\":5"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_reports_datagrams_and_syscalls() {
    let dir = unique_temp_dir("send");
    let sock_path = dir.join("sink.sock");
    let target = format!("unixgram://{}", sock_path.display());

    let mut sink = dgramprims()
        .args(["recv", &target, "--timeout", "5s"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("recv should start");
    wait_for_path(&sock_path, Duration::from_secs(3));

    let output = dgramprims()
        .args([
            "--format",
            "json",
            "send",
            &target,
            "--data",
            "abc",
            "--count",
            "10",
            "--batch-size",
            "4",
        ])
        .output()
        .expect("send should run");

    let _ = sink.kill();
    let _ = sink.wait();
    let _ = std::fs::remove_dir_all(&dir);

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send report should be json");
    assert_eq!(report["datagrams"], 10);
    assert_eq!(report["bytes"], 30);
    assert_eq!(report["batch_size"], 4);
    assert!(report["syscalls"].as_u64().is_some_and(|n| n >= 3));
}

#[test]
fn send_without_resolution_uses_a_connected_socket() {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("receiver should bind");
    receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");
    let port = receiver.local_addr().expect("receiver address").port();

    let output = dgramprims()
        .args([
            "--format",
            "json",
            "send",
            &format!("udp://127.0.0.1:{port}"),
            "--data",
            "hi",
            "--count",
            "3",
            "--no-resolve",
        ])
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send report should be json");
    assert_eq!(report["datagrams"], 3);

    let mut buf = [0u8; 16];
    for _ in 0..3 {
        let (n, _) = receiver.recv_from(&mut buf).expect("datagram should arrive");
        assert_eq!(&buf[..n], b"hi");
    }
}

#[test]
fn echo_returns_datagrams_to_sender() {
    let port = free_udp_port();
    let target = format!("udp://127.0.0.1:{port}");
    let mut child = dgramprims()
        .args(["echo", &target, "--count", "1"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("echo should start");

    let client = UdpSocket::bind("127.0.0.1:0").expect("client should bind");
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("read timeout should apply");

    let mut buf = [0u8; 64];
    let start = Instant::now();
    let reply = loop {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "echo never answered"
        );
        client
            .send_to(b"ping", ("127.0.0.1", port))
            .expect("client send should succeed");
        if let Ok((n, from)) = client.recv_from(&mut buf) {
            assert_eq!(from.port(), port);
            break buf[..n].to_vec();
        }
    };
    assert_eq!(reply, b"ping");

    let status = child.wait().expect("echo should exit after --count");
    assert!(status.success());
}

#[test]
fn doctor_json_lists_checks() {
    let output = dgramprims()
        .args(["--format", "json", "doctor"])
        .output()
        .expect("doctor should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor output should be json");
    assert!(report["schema_id"]
        .as_str()
        .is_some_and(|id| id.ends_with("doctor-report.schema.json")));
    assert_eq!(report["overall"], "pass");
    let checks = report["checks"].as_array().expect("checks array");
    assert!(checks
        .iter()
        .any(|c| c["name"] == "udp_loopback_batch" && c["status"] == "pass"));
}

#[test]
fn envinfo_and_version_report_package_version() {
    let envinfo = dgramprims()
        .env("DGRAMPRIMS_BATCH_SIZE", "32")
        .args(["--format", "json", "envinfo"])
        .output()
        .expect("envinfo should run");
    assert!(envinfo.status.success());
    let info: serde_json::Value =
        serde_json::from_slice(&envinfo.stdout).expect("envinfo output should be json");
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["platform"]["batch_syscalls"], true);
    assert_eq!(info["syscalls"]["recvmmsg"], "ok");
    assert_eq!(info["syscalls"]["sendmmsg"], "ok");
    assert_eq!(info["batch"]["effective_size"], 32);
    assert_eq!(info["batch"]["size_source"], "DGRAMPRIMS_BATCH_SIZE");
    assert_eq!(info["sockets"]["unix_socket_mode"], "600");

    let version = dgramprims()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(version.status.success());
    assert_eq!(
        String::from_utf8_lossy(&version.stdout).trim(),
        format!("dgramprims {}", env!("CARGO_PKG_VERSION"))
    );
}
