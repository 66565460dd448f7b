use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dgramprims_batch::{BatchConn, Message};
use dgramprims_transport::{BatchSyscall, RawConn, SocketAddress, UnixAddress};
use tracing::{info, warn};

use crate::cmd::recv::{bind, BatchReceiver};
use crate::cmd::send::send_all;
use crate::cmd::{install_ctrlc_handler, parse_endpoint, EchoArgs};
use crate::exit::{batch_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{Datagram, OutputFormat};

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint("invalid bind endpoint", &args.bind)?;
    if args.max_size == 0 {
        return Err(CliError::new(USAGE, "--max-size must be greater than zero"));
    }
    if args.batch.no_resolve {
        return Err(CliError::new(
            USAGE,
            "echo needs peer addresses; --no-resolve is not supported",
        ));
    }

    let conn = bind(&endpoint, &args.batch)?;
    info!(endpoint = %endpoint, batch_size = conn.batch_size(), "echo server ready");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut receiver = BatchReceiver::new(conn.batch_size(), args.max_size);
    let mut echoed = 0usize;

    while running.load(Ordering::SeqCst) {
        let batch = match receiver.recv(&conn) {
            Ok(batch) => batch,
            Err(err) if err.is_timeout() => continue,
            Err(err) => return Err(batch_error("receive failed", err)),
        };

        echoed = echoed.saturating_add(echo_batch(&conn, batch)?);
        if args.count.is_some_and(|count| echoed >= count) {
            return Ok(SUCCESS);
        }
    }

    Ok(SUCCESS)
}

/// Send each datagram back to its sender with as few `sendmmsg` calls as
/// possible. Datagrams from peers that cannot be addressed are dropped.
fn echo_batch<C: RawConn, S: BatchSyscall>(
    conn: &BatchConn<C, S>,
    batch: Vec<Datagram>,
) -> CliResult<usize> {
    let mut replies: Vec<(SocketAddress, Vec<u8>)> = batch
        .into_iter()
        .filter_map(|datagram| match datagram.addr {
            Some(SocketAddress::Unix(UnixAddress::Unnamed)) | None => {
                warn!(
                    size = datagram.payload.len(),
                    "dropping datagram from unaddressable peer"
                );
                None
            }
            Some(addr) => Some((addr, datagram.payload)),
        })
        .collect();
    if replies.is_empty() {
        return Ok(0);
    }

    info!(count = replies.len(), "echoing batch");
    let mut msgs: Vec<Message<'_>> = replies
        .iter_mut()
        .map(|(addr, payload)| Message::new(payload.as_mut_slice()).with_addr(addr.clone()))
        .collect();
    send_all(conn, &mut msgs, "echo send failed")?;
    Ok(msgs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgramprims_transport::DatagramSocket;
    use std::time::Duration;

    #[test]
    fn unaddressable_peers_are_skipped() {
        let (a, _b) = DatagramSocket::unixgram_pair().unwrap();
        let conn = BatchConn::from_socket(a);
        let batch = vec![
            Datagram {
                addr: None,
                payload: b"x".to_vec(),
                truncated: false,
                control_size: 0,
            },
            Datagram {
                addr: Some(SocketAddress::Unix(UnixAddress::Unnamed)),
                payload: b"y".to_vec(),
                truncated: false,
                control_size: 0,
            },
        ];
        assert_eq!(echo_batch(&conn, batch).unwrap(), 0);
    }

    #[test]
    fn replies_reach_each_sender() {
        let server_sock = DatagramSocket::bind_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = server_sock.local_addr().unwrap();
        let server = BatchConn::from_socket(server_sock);

        let client_sock = DatagramSocket::bind_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        client_sock
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let client = BatchConn::from_socket(client_sock);
        let client_addr = client.get_ref().local_addr().unwrap();

        let batch = vec![
            Datagram {
                addr: Some(client_addr.clone()),
                payload: b"one".to_vec(),
                truncated: false,
                control_size: 0,
            },
            Datagram {
                addr: Some(client_addr),
                payload: b"two".to_vec(),
                truncated: false,
                control_size: 0,
            },
        ];
        assert_eq!(echo_batch(&server, batch).unwrap(), 2);

        let mut receiver = BatchReceiver::new(4, 16);
        let mut got = Vec::new();
        while got.len() < 2 {
            got.extend(receiver.recv(&client).unwrap());
        }
        assert_eq!(got[0].payload, b"one");
        assert_eq!(got[1].payload, b"two");
        assert!(got.iter().all(|d| d.addr.as_ref() == Some(&server_addr)));
    }
}
