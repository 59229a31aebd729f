//! Agent orchestration: the reset handshake followed by the async driver
//! loop around [`session::AgentSession`] — a pure state machine plus a
//! thin `tokio` shell around it.

pub mod session;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::aead::{Codec, Packet};
use crate::chunk::split_data;
use crate::config::{TransportKind, TunnelConfig};
use crate::error::TransportError;
use crate::label_codec::{self, RESET_SEQ};
use crate::transport::{DnsClient, TcpDnsClient, UdpDnsClient};
use session::{AckOutcome, AgentSession};

/// Reply observed for the reset sentinel: `1.2.0.0`.
const RESET_CONFIRMED_ACK: u16 = 0;

fn server_addr(config: &TunnelConfig) -> SocketAddr {
    SocketAddr::new(config.listen_address, config.resolved_port())
}

async fn make_client(config: &TunnelConfig) -> Result<Box<dyn DnsClient>, TransportError> {
    let addr = server_addr(config);
    Ok(match config.transport {
        TransportKind::Udp => Box::new(UdpDnsClient::connect(addr).await?),
        TransportKind::Tcp => Box::new(TcpDnsClient::new(addr)),
    })
}

/// §4.5: issue the reset QNAME, over whichever transport is configured,
/// and confirm the server answered `1.2.0.0`.
pub async fn perform_reset(config: &TunnelConfig) -> Result<bool, TransportError> {
    let client = make_client(config).await?;
    let qname = label_codec::encode_qname(RESET_SEQ, &[], &config.domain)
        .expect("reset qname never exceeds dns length limits");

    log::info!("sending reset signal...");
    match client.query(&qname, config.timeout).await? {
        Some(ack) if ack == RESET_CONFIRMED_ACK => {
            log::info!("server reset confirmed");
            Ok(true)
        }
        Some(other) => {
            log::warn!("unexpected reset reply: {other}");
            Ok(false)
        }
        None => {
            log::warn!("no reply to reset signal");
            Ok(false)
        }
    }
}

/// Encrypt and label-encode chunk `seq`'s plaintext into a QNAME.
fn build_chunk_qname(codec: &Codec, domain: &str, seq: u64, plaintext: &[u8]) -> String {
    let packet: Packet = codec.seal(plaintext);
    label_codec::encode_qname(seq as i64, &packet.to_bytes(), domain)
        .expect("chunk qnames are sized within the dns length limits")
}

/// Run the full transfer to completion: Steps 1–5 of the protocol loop,
/// driven until `AgentSession::is_complete()`.
pub async fn transfer(config: &TunnelConfig, message: &[u8]) -> Result<(), TransportError> {
    let chunks = split_data(message, config.chunk_size);
    let total = chunks.len();
    log::info!("total chunks: {total}");

    let mut session = AgentSession::new(chunks, config);
    if session.is_complete() {
        return Ok(()); // B1: empty message, nothing to send
    }

    let client = make_client(config).await?;
    let key = config
        .key_bytes()
        .expect("config was validated before transfer began");
    let codec = Codec::new(&key);

    while !session.is_complete() {
        let now = Instant::now();
        session.schedule(now);

        let sweep = session.sweep_timeouts(Instant::now());
        if session.is_complete() {
            break;
        }
        if sweep.collapsed {
            continue;
        }

        let probe_seq = session.base();
        let qname = build_chunk_qname(&codec, &config.domain, probe_seq, session.probe_chunk());

        let reply = client.query(&qname, config.timeout).await;
        let ack = match reply {
            Ok(Some(ack)) => Some(ack as u64),
            Ok(None) => None,
            Err(e) => {
                log::debug!("transport error on probe for chunk {probe_seq}: {e}");
                None
            }
        };

        let Some(ack_seq) = ack else {
            // Case A
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };

        match session.on_ack(ack_seq, Instant::now()) {
            AckOutcome::Advanced { new_base } => {
                log::info!("ack received for seq {}", new_base.saturating_sub(1));
            }
            AckOutcome::Duplicate { .. }
            | AckOutcome::ForcedDrop { .. }
            | AckOutcome::FastRetransmit { .. }
            | AckOutcome::FastRetransmitDrop { .. }
            | AckOutcome::Stale => {}
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    log::info!("all chunks sent and acknowledged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_qname_is_well_formed() {
        let qname = label_codec::encode_qname(RESET_SEQ, &[], "tunnel.example.com").unwrap();
        assert_eq!(qname, "seq-1.reset.tunnel.example.com");
    }
}
