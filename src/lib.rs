//! dns-tunnel: a covert DNS label tunnel with AEAD-encrypted chunks and a
//! Reno-style congestion-controlled delivery protocol.
//!
//! Neither side uses DNS for name resolution — DNS is purely the carrier.
//! An agent reads a payload, splits it into fixed-size chunks, encrypts
//! each one, and smuggles the ciphertext into the labels of ordinary
//! recursive DNS queries. A server answers as an authoritative-style
//! resolver for a configured domain suffix, decrypting and reassembling
//! chunks in order, and returns cumulative acknowledgements in the A
//! record of its replies.
//!
//! ## Layout
//!
//! - [`label_codec`] — QNAME ⇄ `(sequence, packet)` mapping.
//! - [`aead`] — AES-256-GCM sealing with the reference's 16-byte nonce.
//! - [`wire`] — raw DNS query/response byte encoding.
//! - [`transport`] — UDP/TCP DNS client and server plumbing.
//! - [`chunk`] — payload splitting.
//! - [`agent`] — the sender: reset handshake plus the congestion-controlled
//!   transfer loop.
//! - [`server`] — the receiver: in-order reassembly and ACK generation.
//! - [`config`] — [`TunnelConfig`], the shared configuration type.
//! - [`error`] — the `thiserror`-based error taxonomy.

pub mod aead;
pub mod agent;
pub mod chunk;
pub mod config;
pub mod error;
pub mod label_codec;
pub mod server;
pub mod transport;
pub mod wire;

pub use config::TunnelConfig;
pub use error::TunnelError;
