use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dgramprims_transport::SocketAddress;
use serde::Serialize;

const DATAGRAM_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/dgramprims/cli/v1/datagram-received.schema.json";
const SEND_SCHEMA_ID: &str = "https://schemas.3leaps.dev/dgramprims/cli/v1/send-report.schema.json";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A received datagram, detached from the batch buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: Option<SocketAddress>,
    pub payload: Vec<u8>,
    pub truncated: bool,
    pub control_size: usize,
}

impl Datagram {
    pub fn peer(&self) -> String {
        self.addr
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Serialize)]
struct DatagramOutput<'a> {
    schema_id: &'a str,
    peer: &'a str,
    size: usize,
    truncated: bool,
    control_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_datagram(datagram: &Datagram, format: OutputFormat) {
    let peer = datagram.peer();
    match format {
        OutputFormat::Json => {
            let out = DatagramOutput {
                schema_id: DATAGRAM_SCHEMA_ID,
                peer: &peer,
                size: datagram.payload.len(),
                truncated: datagram.truncated,
                control_size: datagram.control_size,
                payload: payload_preview(&datagram.payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIZE", "FLAGS", "PAYLOAD"])
                .add_row(vec![
                    peer,
                    datagram.payload.len().to_string(),
                    flags_text(datagram).to_string(),
                    payload_preview(&datagram.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} size={} flags={} payload={}",
                peer,
                datagram.payload.len(),
                flags_text(datagram),
                payload_preview(&datagram.payload)
            );
        }
        OutputFormat::Raw => print_raw(&datagram.payload),
    }
}

#[derive(Debug, Serialize)]
pub struct SendReport {
    pub schema_id: &'static str,
    pub target: String,
    pub datagrams: usize,
    pub bytes: usize,
    pub syscalls: usize,
    pub batch_size: usize,
}

impl SendReport {
    pub fn new(target: String, batch_size: usize) -> Self {
        Self {
            schema_id: SEND_SCHEMA_ID,
            target,
            datagrams: 0,
            bytes: 0,
            syscalls: 0,
            batch_size,
        }
    }
}

pub fn print_send_report(report: &SendReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "DATAGRAMS", "BYTES", "SYSCALLS"])
                .add_row(vec![
                    report.target.clone(),
                    report.datagrams.to_string(),
                    report.bytes.to_string(),
                    report.syscalls.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "sent {} datagrams ({} bytes) to {} in {} syscalls",
            report.datagrams, report.bytes, report.target, report.syscalls
        ),
        OutputFormat::Raw => println!("{}", report.datagrams),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn flags_text(datagram: &Datagram) -> &'static str {
    if datagram.truncated {
        "TRUNC"
    } else {
        "-"
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
