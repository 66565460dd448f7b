use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use dgramprims_batch::{BatchConn, Message};
use dgramprims_transport::{
    BatchSyscall, DatagramSocket, Endpoint, RawConn, SocketAddress, TransportError,
};
use tracing::{debug, info};

use crate::cmd::{parse_endpoint, SendArgs};
use crate::exit::{batch_error, transport_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_send_report, OutputFormat, SendReport};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let target = parse_endpoint("invalid target", &args.target)?;
    let socket = match &args.bind {
        Some(bind) => DatagramSocket::bind(&parse_endpoint("invalid bind endpoint", bind)?),
        None => ephemeral_socket(&target),
    }
    .map_err(|err| transport_error("bind failed", err))?;

    // Without address encoding the kernel needs a default destination.
    let dest = if args.batch.no_resolve {
        socket
            .connect(&target.address)
            .map_err(|err| transport_error("connect failed", err))?;
        None
    } else {
        Some(&target.address)
    };

    let payload = resolve_payload(&args)?;
    let network = socket.network();
    let conn = BatchConn::with_config(socket, network, &args.batch.config());

    let mut report = SendReport::new(target.to_string(), conn.batch_size());
    send_copies(&conn, dest, &payload, args.count, &mut report)?;
    info!(
        target = %target,
        datagrams = report.datagrams,
        syscalls = report.syscalls,
        "send complete"
    );

    print_send_report(&report, format);
    Ok(SUCCESS)
}

/// A socket able to reach `target` from an ephemeral local address.
fn ephemeral_socket(target: &Endpoint) -> Result<DatagramSocket, TransportError> {
    match &target.address {
        SocketAddress::Inet(SocketAddr::V4(_)) => {
            DatagramSocket::bind_udp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        }
        SocketAddress::Inet(SocketAddr::V6(_)) => {
            DatagramSocket::bind_udp(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
        }
        SocketAddress::Unix(_) => DatagramSocket::unbound_unixgram(),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

/// Send `count` copies of `payload`, at most one batch per call.
fn send_copies<C: RawConn, S: BatchSyscall>(
    conn: &BatchConn<C, S>,
    dest: Option<&SocketAddress>,
    payload: &[u8],
    count: usize,
    report: &mut SendReport,
) -> CliResult<()> {
    let mut remaining = count;
    while remaining > 0 {
        let chunk = remaining.min(conn.batch_size());
        let mut bufs = vec![payload.to_vec(); chunk];
        let mut msgs: Vec<Message<'_>> = bufs
            .iter_mut()
            .map(|buf| {
                let msg = Message::new(buf.as_mut_slice());
                match dest {
                    Some(addr) => msg.with_addr(addr.clone()),
                    None => msg,
                }
            })
            .collect();

        report.syscalls += send_all(conn, &mut msgs, "send failed")?;
        report.bytes += msgs.iter().map(|m| m.n).sum::<usize>();
        report.datagrams += chunk;
        remaining -= chunk;
    }
    Ok(())
}

/// Send every message, resubmitting the unsent suffix after a partial
/// completion. Returns the number of syscalls made.
pub fn send_all<C: RawConn, S: BatchSyscall>(
    conn: &BatchConn<C, S>,
    msgs: &mut [Message<'_>],
    context: &str,
) -> CliResult<usize> {
    let mut sent = 0;
    let mut syscalls = 0;
    while sent < msgs.len() {
        let n = conn
            .send_batch(&mut msgs[sent..], 0)
            .map_err(|err| batch_error(context, err))?;
        syscalls += 1;
        if n == 0 {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("{context}: sendmmsg made no progress"),
            ));
        }
        if sent + n < msgs.len() {
            debug!(
                sent = n,
                remaining = msgs.len() - sent - n,
                "partial batch, resubmitting remainder"
            );
        }
        sent += n;
    }
    Ok(syscalls)
}
