//! Egress transport abstraction
//!
//! A dialer is an outbound path; the checks never open sockets themselves but
//! ask the transport to connect "from this path" to a concrete address.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};

/// Byte stream returned by `Transport::dial_tcp`
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProxyStream for T {}

/// Connected datagram socket returned by `Transport::dial_udp`
#[async_trait]
pub trait PacketConn: Send + Sync {
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens connections through one egress path
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial_tcp(&self, addr: SocketAddr) -> io::Result<Box<dyn ProxyStream>>;
    async fn dial_udp(&self, addr: SocketAddr) -> io::Result<Box<dyn PacketConn>>;
}

/// Dials straight from the host network stack
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTransport;

#[async_trait]
impl Transport for DirectTransport {
    async fn dial_tcp(&self, addr: SocketAddr) -> io::Result<Box<dyn ProxyStream>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    async fn dial_udp(&self, addr: SocketAddr) -> io::Result<Box<dyn PacketConn>> {
        let bind: SocketAddr = if addr.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(addr).await?;
        Ok(Box::new(ConnectedUdp { socket }))
    }
}

struct ConnectedUdp {
    socket: UdpSocket,
}

#[async_trait]
impl PacketConn for ConnectedUdp {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_direct_tcp_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"pong").await.unwrap();
        });

        let mut stream = DirectTransport.dial_tcp(addr).await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_direct_udp_roundtrip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..n], peer).await.unwrap();
        });

        let conn = DirectTransport.dial_udp(addr).await.unwrap();
        conn.send(b"echo").await.unwrap();
        let mut buf = [0u8; 16];
        let n = conn.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo");
    }
}
