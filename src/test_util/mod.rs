//! Utilities for testing code that uses the probing engine: an Outcome Record collector and a
//!  UDP echo peer. They are part of the regular (non-#[cfg(test)]) code so that applications
//!  embedding the engine can use them in their own tests.

pub mod outcome;

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{trace, warn};

/// Starts a UDP echo service on an ephemeral loopback port, returning its address. The service
///  runs until the runtime shuts down.
pub async fn spawn_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await
        .expect("binding to an ephemeral loopback port should always work");
    let addr = socket.local_addr()
        .expect("a bound socket has a local address");

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65536];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    trace!("echoing {} bytes to {}", len, from);
                    if let Err(e) = socket.send_to(&buf[..len], from).await {
                        warn!("echo server: error sending: {}", e);
                    }
                }
                Err(e) => warn!("echo server: error receiving: {}", e),
            }
        }
    });

    addr
}
