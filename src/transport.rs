//! DNS query/response transport, over either UDP or TCP.
//!
//! The client binds a socket and connects it to the server address (so
//! NAT/firewall traversal behaves the same as an ordinary resolver
//! lookup), then exchanges raw DNS packets with `tokio::time::timeout`
//! around every round trip. TCP framing follows RFC 1035 §4.2.2: a
//! two-byte big-endian length prefix ahead of each message.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::error::TransportError;
use crate::wire;

/// One round trip: send a DNS query, wait for the matching response.
/// Implemented once for UDP and once for TCP so the agent's protocol loop
/// does not need to know which transport it is driving.
#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn query(&self, qname: &str, timeout_duration: std::time::Duration) -> Result<Option<u16>, TransportError>;
}

fn next_transaction_id() -> u16 {
    rand::random()
}

/// UDP DNS client. One query per socket round trip, matching the
/// fire-and-forget nature of the label tunnel (no retries at this layer —
/// the agent's own timeout/retransmit logic handles loss).
pub struct UdpDnsClient {
    socket: UdpSocket,
}

impl UdpDnsClient {
    pub async fn connect(server_addr: SocketAddr) -> Result<Self, TransportError> {
        let local_addr: SocketAddr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        }
        .parse()
        .expect("static bind address is valid");

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(server_addr).await?;
        log::info!("udp dns client bound to {} -> server {}", socket.local_addr()?, server_addr);
        Ok(UdpDnsClient { socket })
    }
}

#[async_trait]
impl DnsClient for UdpDnsClient {
    async fn query(&self, qname: &str, timeout_duration: std::time::Duration) -> Result<Option<u16>, TransportError> {
        let transaction_id = next_transaction_id();
        let query = wire::build_query(transaction_id, qname);
        self.socket.send(&query).await?;

        let mut buf = vec![0u8; 512];
        let n = timeout(timeout_duration, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;

        wire::parse_ack_response(&buf[..n])
    }
}

/// TCP DNS client: one fresh connection per query, framed with the RFC
/// 1035 two-byte length prefix. Used for the reset handshake and, when
/// configured, for the whole data transfer.
pub struct TcpDnsClient {
    server_addr: SocketAddr,
}

impl TcpDnsClient {
    pub fn new(server_addr: SocketAddr) -> Self {
        TcpDnsClient { server_addr }
    }
}

#[async_trait]
impl DnsClient for TcpDnsClient {
    async fn query(&self, qname: &str, timeout_duration: std::time::Duration) -> Result<Option<u16>, TransportError> {
        let transaction_id = next_transaction_id();
        let query = wire::build_query(transaction_id, qname);

        let mut stream = timeout(timeout_duration, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| TransportError::Timeout)??;

        write_framed(&mut stream, &query).await?;
        let response = timeout(timeout_duration, read_framed(&mut stream))
            .await
            .map_err(|_| TransportError::Timeout)??;

        wire::parse_ack_response(&response)
    }
}

async fn write_framed(stream: &mut TcpStream, message: &[u8]) -> Result<(), TransportError> {
    let len = message.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(message).await?;
    Ok(())
}

async fn read_framed(stream: &mut TcpStream) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Run a UDP listener, handing each received query to `handler`.
/// `handler` returns the response bytes to send back, or `None` to answer
/// with silence (R5).
pub async fn run_udp_server<F, Fut>(listen_addr: SocketAddr, handler: Arc<F>) -> Result<(), TransportError>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<Vec<u8>>> + Send,
{
    let socket = Arc::new(UdpSocket::bind(listen_addr).await?);
    log::info!("udp dns server listening on {listen_addr}");

    let mut buf = vec![0u8; 512];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await?;
        let packet = buf[..n].to_vec();
        let handler = Arc::clone(&handler);
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            if let Some(response) = handler(packet).await {
                if let Err(e) = socket.send_to(&response, peer).await {
                    log::warn!("failed to send udp response to {peer}: {e}");
                }
            }
        });
    }
}

/// Run a TCP listener, one task per connection, each handling exactly one
/// framed query/response exchange before closing.
pub async fn run_tcp_server<F, Fut>(listen_addr: SocketAddr, handler: Arc<F>) -> Result<(), TransportError>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<Vec<u8>>> + Send,
{
    let listener = TcpListener::bind(listen_addr).await?;
    log::info!("tcp dns server listening on {listen_addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_conn(stream, handler).await {
                log::debug!("tcp connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_tcp_conn<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<(), TransportError>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<Vec<u8>>> + Send,
{
    let packet = read_framed(&mut stream).await?;
    if let Some(response) = handler(packet).await {
        write_framed(&mut stream, &response).await?;
    }
    Ok(())
}
