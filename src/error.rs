//! Error taxonomy for the tunnel: configuration, codec, crypto, transport.
//!
//! One `thiserror` enum per concern instead of a single flat error type, so
//! call sites can match on the failure class that actually matters to them
//! (the server never cares *why* a packet failed to decrypt, only that it
//! should answer with no record).

use thiserror::Error;

/// Fatal at startup; surfaced to the user via `anyhow::Context`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("shared_key must decode to exactly 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("shared_key is not valid hex: {0}")]
    KeyHex(#[from] data_encoding::DecodeError),

    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("chunk_size must be at least 1")]
    ZeroChunkSize,
}

/// Raised by the label codec. Never crashes a process; R1/R2/R5 on the
/// server turn every variant into "no answer record".
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("qname does not carry the configured domain suffix")]
    SuffixMismatch,

    #[error("label `{0}` is not a valid seq<N> label")]
    BadSeqLabel(String),

    #[error("base32 body failed to decode: {0}")]
    Base32(#[from] data_encoding::DecodeError),

    #[error("decoded packet is {0} bytes, need at least 32 (16-byte nonce + 16-byte tag)")]
    PacketTooShort(usize),

    #[error("qname would exceed the 253-octet DNS limit")]
    QnameTooLong,

    #[error("label would exceed the 63-octet DNS limit")]
    LabelTooLong,
}

/// AEAD authentication/decryption failure. Contained by the server resolver
/// exactly like `CodecError`; surfaced as a transfer-aborting error on the
/// agent only when encryption itself fails, which it structurally cannot.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD authentication failed (tag mismatch or corrupted ciphertext)")]
    TagMismatch,
}

/// Transient; absorbed by the agent's retry/timeout machinery.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dns request timed out")]
    Timeout,

    #[error("malformed dns message: {0}")]
    Malformed(String),
}

impl From<CodecError> for TransportError {
    fn from(e: CodecError) -> Self {
        TransportError::Malformed(e.to_string())
    }
}

/// Umbrella error for the handful of call sites (CLI entry points) that
/// want one `?`-able type across every layer.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
