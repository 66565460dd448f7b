//! Echo server on the tokio executor. Stops after 10 idle seconds.
//!
//! Run with:
//!   cargo run --example async-batch-echo --features async
//!
//! In another terminal:
//!   cargo run --features cli -- send udp://127.0.0.1:5301 --data hello --count 32

#[cfg(any(target_os = "linux", target_os = "android"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Duration;

    use dgramprims::batch::{AsyncBatchConn, Message};
    use dgramprims::transport::DatagramSocket;

    let socket = DatagramSocket::bind_udp("127.0.0.1:5301".parse()?)?;
    eprintln!("Listening on {}", socket.local_addr()?);
    let conn = AsyncBatchConn::new(socket)?;

    let mut bufs = vec![vec![0u8; 2048]; conn.batch_size()];
    loop {
        let mut inbox: Vec<Message<'_>> = bufs.iter_mut().map(|b| Message::new(b)).collect();
        let n = match tokio::time::timeout(Duration::from_secs(10), conn.recv_batch(&mut inbox, 0))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                eprintln!("Idle for 10s, shutting down");
                return Ok(());
            }
        };

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
            sent += conn.send_batch(&mut outbox[sent..], 0).await?;
        }
        eprintln!("Echoed {sent} datagrams");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    eprintln!("async-batch-echo needs recvmmsg/sendmmsg (Linux or Android)");
}
