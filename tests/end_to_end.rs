//! End-to-end scenarios from spec.md §8 (S1, S2, S5, S6), driven entirely
//! in-process: the agent's and server's session state machines are wired
//! together directly, with each per-iteration probe (spec.md §4.4 Step 3)
//! handed straight to `ServerSession::process_query` instead of going over
//! a real socket. No DNS listener, no actual sleeping — a virtual clock
//! advances by exactly the durations the protocol loop itself would sleep
//! for, so the test runs instantly while still exercising every retransmit
//! and congestion-control transition a real transfer would.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dns_tunnel::aead::Codec;
use dns_tunnel::agent::session::AgentSession;
use dns_tunnel::chunk::split_data;
use dns_tunnel::config::TunnelConfig;
use dns_tunnel::label_codec::encode_qname;
use dns_tunnel::server::session::ServerSession;

const DOMAIN: &str = "tunnel.example.com";
const KEY: [u8; 32] = [0x7au8; 32];

fn config() -> TunnelConfig {
    let mut cfg = TunnelConfig::default();
    cfg.domain = DOMAIN.to_string();
    cfg.shared_key_hex = KEY.iter().map(|b| format!("{b:02x}")).collect();
    cfg
}

/// Drive one agent transfer to completion against `server`, in-process.
/// Sequences in `drop_seqs` never reach `server` at all — the probe is
/// simply treated as Case A (no reply), simulating permanent loss at the
/// network layer rather than a codec/crypto failure at the server.
fn run_transfer(message: &[u8], cfg: &TunnelConfig, server: &mut ServerSession, drop_seqs: &HashSet<u64>) {
    let codec = Codec::new(&KEY);
    let chunks = split_data(message, cfg.chunk_size);
    let mut agent = AgentSession::new(chunks, cfg);
    let mut now = Instant::now();

    for _ in 0..10_000 {
        if agent.is_complete() {
            return;
        }
        agent.schedule(now);

        let sweep = agent.sweep_timeouts(now);
        if agent.is_complete() {
            return;
        }
        if sweep.collapsed {
            continue;
        }

        let probe_seq = agent.base();
        if drop_seqs.contains(&probe_seq) {
            now += Duration::from_secs(1); // Case A pacing
            continue;
        }

        let packet = codec.seal(agent.probe_chunk());
        let qname = encode_qname(probe_seq as i64, &packet.to_bytes(), &cfg.domain).unwrap();
        let reply = server.process_query(&qname);

        match reply.ack_value() {
            Some(ack) => {
                agent.on_ack(ack as u64, now);
                now += Duration::from_millis(100); // Step 5 pacing
            }
            None => {
                now += Duration::from_secs(1); // Case A pacing
            }
        }
    }

    panic!("transfer did not complete within the iteration budget");
}

/// S1: chunk_size=50, message="hello". One query carrying seq0; server
/// ACKs 1.2.0.1; agent terminates.
#[test]
fn s1_single_chunk_message_completes_in_one_round() {
    let cfg = config();
    let mut server = ServerSession::new(DOMAIN.to_string(), &KEY);

    run_transfer(b"hello", &cfg, &mut server, &HashSet::new());

    assert_eq!(server.expected_seq(), 1);
    let (message, missing) = server.reconstruct();
    assert_eq!(message, b"hello");
    assert!(missing.is_empty());
}

/// S2: 125 bytes of 'a', chunk_size=50. Three chunks; reconstruction
/// equals the original; final cumulative ACK = 1.2.0.3.
#[test]
fn s2_multi_chunk_message_reassembles_exactly() {
    let cfg = config();
    let mut server = ServerSession::new(DOMAIN.to_string(), &KEY);
    let message = vec![b'a'; 125];

    run_transfer(&message, &cfg, &mut server, &HashSet::new());

    assert_eq!(server.expected_seq(), 3);
    let (reconstructed, missing) = server.reconstruct();
    assert_eq!(reconstructed, message);
    assert!(missing.is_empty());
}

/// S5: permanently drop chunk 4 of a 5-chunk transfer. After exhausting
/// `max_retransmit_per_chunk` the agent advances past it and completes;
/// the server's shutdown-time reconstruction reports it missing.
#[test]
fn s5_permanently_dropped_chunk_is_skipped_and_reported_missing() {
    let cfg = config();
    let mut server = ServerSession::new(DOMAIN.to_string(), &KEY);
    let message = vec![b'x'; cfg.chunk_size * 5]; // exactly 5 chunks, seq 0..4

    let mut drop_seqs = HashSet::new();
    drop_seqs.insert(4u64);
    run_transfer(&message, &cfg, &mut server, &drop_seqs);

    // Chunk 4 never reached the server at all.
    assert_eq!(server.expected_seq(), 4);
    let (_, missing) = server.reconstruct();
    assert_eq!(missing, vec![4]);
}

/// S6: two back-to-back sessions on the same server and key. "one", then
/// reset, then "two". Reconstructed messages are "one" and "two",
/// never a mix of the two.
#[test]
fn s6_reset_between_sessions_never_mixes_messages() {
    let cfg = config();
    let mut server = ServerSession::new(DOMAIN.to_string(), &KEY);

    run_transfer(b"one", &cfg, &mut server, &HashSet::new());
    let (first, _) = server.reconstruct();
    assert_eq!(first, b"one");

    let reset_qname = encode_qname(dns_tunnel::label_codec::RESET_SEQ, &[], DOMAIN).unwrap();
    let reset_reply = server.process_query(&reset_qname);
    assert_eq!(reset_reply.ack_value(), Some(0));
    assert_eq!(server.expected_seq(), 0);
    assert_eq!(server.received_count(), 0);

    run_transfer(b"two", &cfg, &mut server, &HashSet::new());
    let (second, _) = server.reconstruct();
    assert_eq!(second, b"two");
}
