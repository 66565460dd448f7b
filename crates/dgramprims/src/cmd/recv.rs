use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dgramprims_batch::{BatchConn, BatchError, Message};
use dgramprims_transport::{BatchSyscall, DatagramSocket, RawConn};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, parse_endpoint, RecvArgs, POLL_INTERVAL};
use crate::exit::{batch_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_datagram, Datagram, OutputFormat};

pub fn run(args: RecvArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint("invalid bind endpoint", &args.bind)?;
    let idle_timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    if args.max_size == 0 {
        return Err(CliError::new(USAGE, "--max-size must be greater than zero"));
    }

    let conn = bind(&endpoint, &args.batch)?;
    info!(endpoint = %endpoint, batch_size = conn.batch_size(), "receiving datagrams");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut receiver = BatchReceiver::new(conn.batch_size(), args.max_size);
    let mut printed = 0usize;
    let mut last_activity = Instant::now();

    while running.load(Ordering::SeqCst) {
        let batch = match receiver.recv(&conn) {
            Ok(batch) => batch,
            Err(err) if err.is_timeout() => {
                if let Some(limit) = idle_timeout {
                    if last_activity.elapsed() >= limit {
                        return Err(CliError::new(
                            TIMEOUT,
                            format!("no datagram received within {limit:?}"),
                        ));
                    }
                }
                continue;
            }
            Err(err) => return Err(batch_error("receive failed", err)),
        };
        last_activity = Instant::now();

        for datagram in &batch {
            print_datagram(datagram, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

/// Bind `endpoint` with a short read timeout so loops can notice Ctrl-C.
pub fn bind(
    endpoint: &dgramprims_transport::Endpoint,
    opts: &crate::cmd::BatchOpts,
) -> CliResult<BatchConn<DatagramSocket>> {
    let socket = DatagramSocket::bind(endpoint).map_err(|err| transport_error("bind failed", err))?;
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| transport_error("socket setup failed", err))?;
    let network = socket.network();
    Ok(BatchConn::with_config(socket, network, &opts.config()))
}

/// Receive buffers reused across batches.
pub struct BatchReceiver {
    bufs: Vec<Vec<u8>>,
}

impl BatchReceiver {
    pub fn new(batch_size: usize, max_size: usize) -> Self {
        Self {
            bufs: vec![vec![0u8; max_size]; batch_size],
        }
    }

    /// Receive one batch and copy it out of the shared buffers.
    pub fn recv<C: RawConn, S: BatchSyscall>(
        &mut self,
        conn: &BatchConn<C, S>,
    ) -> dgramprims_batch::Result<Vec<Datagram>> {
        let mut msgs: Vec<Message<'_>> = self
            .bufs
            .iter_mut()
            .map(|buf| Message::new(buf.as_mut_slice()))
            .collect();
        let n = match conn.recv_batch(&mut msgs, 0) {
            Ok(n) => n,
            Err(err @ BatchError::Decoding { .. }) => {
                warn!(error = %err, "sender address not decodable; keeping the batch");
                err.completed()
            }
            Err(err) => return Err(err),
        };
        Ok(msgs[..n]
            .iter()
            .map(|msg| Datagram {
                addr: msg.addr.clone(),
                payload: msg.to_vec(),
                truncated: msg.is_truncated(),
                control_size: msg.nn,
            })
            .collect())
    }
}
