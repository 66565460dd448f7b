//! Minimal UDP echo server that moves whole batches per syscall.
//!
//! Run with:
//!   cargo run --example batch-echo
//!
//! In another terminal:
//!   cargo run --features cli -- send udp://127.0.0.1:5300 --data hello --count 32

#[cfg(any(target_os = "linux", target_os = "android"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use dgramprims::batch::{BatchConn, Message};
    use dgramprims::transport::DatagramSocket;

    let socket = DatagramSocket::bind_udp("127.0.0.1:5300".parse()?)?;
    eprintln!("Listening on {}", socket.local_addr()?);
    let conn = BatchConn::from_socket(socket);

    let mut bufs = vec![vec![0u8; 2048]; conn.batch_size()];
    loop {
        let mut inbox: Vec<Message<'_>> = bufs.iter_mut().map(|b| Message::new(b)).collect();
        let n = conn.recv_batch(&mut inbox, 0)?;
        eprintln!("Received {n} datagrams in one call");

        // Reply with exactly the received bytes, addressed to each sender.
        let mut replies: Vec<(Vec<u8>, _)> = inbox[..n]
            .iter()
            .filter_map(|m| m.addr.clone().map(|addr| (m.to_vec(), addr)))
            .collect();
        let mut outbox: Vec<Message<'_>> = replies
            .iter_mut()
            .map(|(payload, addr)| Message::new(payload).with_addr(addr.clone()))
            .collect();

        let mut sent = 0;
        while sent < outbox.len() {
            sent += conn.send_batch(&mut outbox[sent..], 0)?;
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    eprintln!("batch-echo needs recvmmsg/sendmmsg (Linux or Android)");
}
