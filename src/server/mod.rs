//! Server orchestration: bind the configured transport, drive queries
//! through [`session::ServerSession`] under a single lock, and run until
//! interrupted, printing the reconstructed payload on shutdown.

pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{TransportKind, TunnelConfig};
use crate::transport;
use crate::wire;
use session::{ServerReply, ServerSession};

/// Run the server to completion (blocks until ctrl-c), then prints the
/// reconstructed payload and any missing sequence numbers.
pub async fn run(config: TunnelConfig) -> anyhow::Result<()> {
    let key = config.key_bytes()?;
    let session = Arc::new(Mutex::new(ServerSession::new(config.domain.clone(), &key)));

    let listen_addr = SocketAddr::new(config.listen_address, config.resolved_port());
    let handler_session = Arc::clone(&session);

    let handler = Arc::new(move |packet: Vec<u8>| {
        let session = Arc::clone(&handler_session);
        async move { handle_packet(&session, packet).await }
    });

    let listener = match config.transport {
        TransportKind::Udp => tokio::spawn(transport::run_udp_server(listen_addr, handler)),
        TransportKind::Tcp => tokio::spawn(transport::run_tcp_server(listen_addr, handler)),
    };

    log::info!("dns tunnel server listening on {listen_addr} ({:?}) for domain {}", config.transport, config.domain);

    tokio::select! {
        result = listener => {
            if let Ok(Err(e)) = result {
                log::error!("listener exited with error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down...");
        }
    }

    let session = session.lock().await;
    print_reconstruction(&session);
    Ok(())
}

async fn handle_packet(session: &Arc<Mutex<ServerSession>>, packet: Vec<u8>) -> Option<Vec<u8>> {
    let (_, qname) = match wire::parse_query(&packet) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("failed to parse incoming dns query: {e}");
            return None;
        }
    };

    let reply = {
        let mut session = session.lock().await;
        session.process_query(&qname)
    };

    match reply {
        ServerReply::NoAnswer => None,
        ServerReply::ResetConfirmed | ServerReply::Ack(_) => {
            let ack = reply.ack_value().expect("non-NoAnswer reply always carries an ack value");
            match wire::build_ack_response(&packet, ack) {
                Ok(response) => Some(response),
                Err(e) => {
                    log::warn!("failed to build dns response: {e}");
                    None
                }
            }
        }
    }
}

fn print_reconstruction(session: &ServerSession) {
    if session.received_count() == 0 {
        println!("No chunks received. Nothing to reconstruct.");
        return;
    }

    let (message, missing) = session.reconstruct();
    println!(
        "Reconstructed message:\n    {}",
        String::from_utf8_lossy(&message)
    );
    if missing.is_empty() {
        println!("All chunks received successfully.");
    } else {
        println!("Missing chunks: {missing:?}");
    }
}

