use std::io;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;

/// The connected datagram socket a session sends probes on and receives replies from. Sender and
///  receiver share it, so both operations take `&self`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProbeSocket: Send + Sync {
    async fn send(&self, payload: &[u8]) -> io::Result<usize>;

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

#[async_trait]
impl ProbeSocket for UdpSocket {
    async fn send(&self, payload: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, payload).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }
}

/// ICMP errors for earlier datagrams are reported on a connected UDP socket's next send or
///  receive call, whichever comes first. They say nothing about the socket itself.
pub fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
    )
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::port_unreachable(io::ErrorKind::ConnectionRefused, true)]
    #[case::host_unreachable(io::ErrorKind::HostUnreachable, true)]
    #[case::network_unreachable(io::ErrorKind::NetworkUnreachable, true)]
    #[case::would_block(io::ErrorKind::WouldBlock, true)]
    #[case::not_connected(io::ErrorKind::NotConnected, false)]
    #[case::other(io::ErrorKind::Other, false)]
    fn test_is_transient(#[case] kind: io::ErrorKind, #[case] expected: bool) {
        assert_eq!(is_transient(&io::Error::from(kind)), expected);
    }

    #[tokio::test]
    async fn test_udp_socket() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer.local_addr().unwrap()).await.unwrap();
        peer.connect(socket.local_addr().unwrap()).await.unwrap();

        let socket: &dyn ProbeSocket = &socket;
        assert_eq!(socket.send(b"ping").await.unwrap(), 4);

        let mut buf = [0u8; 16];
        let len = peer.recv(&mut buf).await.unwrap();
        peer.send(&buf[..len]).await.unwrap();

        let len = socket.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
    }
}
