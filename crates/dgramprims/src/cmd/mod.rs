use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use dgramprims_batch::{BatchConfig, DEFAULT_BATCH_SIZE};
use dgramprims_transport::Endpoint;

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod echo;
pub mod envinfo;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod recv;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod send;
pub mod version;

/// How long a receive loop blocks before rechecking for Ctrl-C.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send datagrams in batches.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Send(SendArgs),
    /// Receive batches and print each datagram.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Recv(RecvArgs),
    /// Send every received datagram back to its sender.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        Command::Send(args) => send::run(args, format),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        Command::Recv(args) => recv::run(args, format),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct BatchOpts {
    /// Messages per recvmmsg/sendmmsg call.
    #[arg(
        long,
        env = "DGRAMPRIMS_BATCH_SIZE",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,
    /// Skip peer address encoding and decoding.
    #[arg(long)]
    pub no_resolve: bool,
}

impl BatchOpts {
    pub fn config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            resolve_addresses: !self.no_resolve,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination endpoint (udp://host:port, unixgram:///path, host:port, /path).
    pub target: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Number of copies to send.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
    /// Local endpoint to send from. Default: an ephemeral socket.
    #[arg(long, value_name = "ENDPOINT")]
    pub bind: Option<String>,
    #[command(flatten)]
    pub batch: BatchOpts,
}

#[derive(Args, Debug)]
pub struct RecvArgs {
    /// Endpoint to bind.
    pub bind: String,
    /// Exit after receiving N datagrams.
    #[arg(long)]
    pub count: Option<usize>,
    /// Receive buffer size per datagram in bytes.
    #[arg(long, default_value_t = 65_536)]
    pub max_size: usize,
    /// Give up when nothing arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    #[command(flatten)]
    pub batch: BatchOpts,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Endpoint to bind.
    pub bind: String,
    /// Exit after echoing N datagrams.
    #[arg(long)]
    pub count: Option<usize>,
    /// Receive buffer size per datagram in bytes.
    #[arg(long, default_value_t = 65_536)]
    pub max_size: usize,
    #[command(flatten)]
    pub batch: BatchOpts,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

fn parse_batch_size(input: &str) -> Result<usize, String> {
    let value: usize = input
        .parse()
        .map_err(|_| format!("invalid batch size: {input}"))?;
    if value == 0 {
        return Err("batch size must be greater than zero".to_string());
    }
    Ok(value)
}

pub fn parse_endpoint(context: &str, input: &str) -> CliResult<Endpoint> {
    input
        .parse::<Endpoint>()
        .map_err(|err| transport_error(context, err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
