//! Server-side reassembly state machine: rules R1–R7 of the tunnel's
//! query-processing contract, plus the shutdown-time reconstruction a
//! resolver performs when a transfer ends.
//!
//! Kept as a synchronous, transport-agnostic struct — no socket, no
//! `tokio` — so the whole resolver contract is unit-testable without a
//! DNS listener: a pure function from (incoming QNAME, current session
//! state) to (updated session state, reply A-record).

use std::collections::BTreeMap;

use crate::aead::Codec;
use crate::error::CodecError;
use crate::label_codec::{self, RESET_SEQ};

/// What the resolver decided to answer with, for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerReply {
    /// `1.2.0.0` — reset confirmed.
    ResetConfirmed,
    /// `1.2.H.L` — cumulative ACK, `next_expected = H*256 + L`.
    Ack(u16),
    /// No answer record at all (R1, R2, R5).
    NoAnswer,
}

impl ServerReply {
    /// The two low address octets this reply would carry, or `None` for
    /// [`ServerReply::NoAnswer`].
    pub fn ack_value(self) -> Option<u16> {
        match self {
            ServerReply::ResetConfirmed => Some(0),
            ServerReply::Ack(v) => Some(v),
            ServerReply::NoAnswer => None,
        }
    }
}

/// One tunnel session's reassembly state: the chunk map and the
/// lowest-not-yet-received cursor.
pub struct ServerSession {
    domain: String,
    codec: Codec,
    received_chunks: BTreeMap<u64, Vec<u8>>,
    expected_seq: u64,
}

impl ServerSession {
    pub fn new(domain: String, key: &[u8; 32]) -> Self {
        ServerSession {
            domain,
            codec: Codec::new(key),
            received_chunks: BTreeMap::new(),
            expected_seq: 0,
        }
    }

    /// Process one incoming QNAME, applying R1–R7 and returning the reply
    /// to send. State is mutated in place; callers are expected to hold
    /// whatever lock guards concurrent access for the duration of this
    /// call (see `server::mod`).
    ///
    /// The sequence number is parsed on its own, before the body is ever
    /// touched, so R4's stale-sequence check can run ahead of the
    /// base32/length decode — matching `server.py`'s own order (the
    /// `seq_num < expected_seq` check at server.py:52 precedes the
    /// base32 decode at server.py:59-63). A stale query therefore always
    /// gets the current cumulative ACK, even with a malformed or
    /// too-short body.
    pub fn process_query(&mut self, qname: &str) -> ServerReply {
        let seq = match label_codec::parse_seq(qname, &self.domain) {
            Ok(seq) => seq,
            Err(CodecError::SuffixMismatch) => return ServerReply::NoAnswer, // R1
            Err(_) => return ServerReply::NoAnswer,                         // R2: malformed seq label
        };

        if seq == RESET_SEQ {
            // R3
            self.received_chunks.clear();
            self.expected_seq = 0;
            log::info!("server state reset by client");
            return ServerReply::ResetConfirmed;
        }
        let seq = seq as u64;

        if seq < self.expected_seq {
            // R4
            return ServerReply::Ack(self.current_ack());
        }

        let packet = match label_codec::decode_body(qname, &self.domain) {
            Ok(packet) => packet,
            Err(_) => {
                log::debug!("failed to decode body for seq {seq}");
                return ServerReply::NoAnswer; // R5
            }
        };
        if packet.len() < 32 {
            log::debug!("malformed packet from seq {seq} (length {})", packet.len());
            return ServerReply::NoAnswer; // R5
        }
        let aead_packet = crate::aead::Packet::from_bytes(&packet);
        let plaintext = match self.codec.open(&aead_packet) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                log::debug!("decryption failed for seq {seq}");
                return ServerReply::NoAnswer; // R5
            }
        };

        if self.received_chunks.contains_key(&seq) {
            log::info!("duplicate chunk {seq} ignored");
            return ServerReply::Ack(self.current_ack()); // R6
        }

        // R7
        log::debug!(
            "received {seq}: {}",
            String::from_utf8_lossy(&plaintext)
        );
        self.received_chunks.insert(seq, plaintext);
        log::info!("stored chunk {seq}");
        while self.received_chunks.contains_key(&self.expected_seq) {
            self.expected_seq += 1;
        }
        ServerReply::Ack(self.current_ack())
    }

    fn current_ack(&self) -> u16 {
        // `expected_seq` is an unbounded counter conceptually, but the
        // wire format only has 16 bits of room; this mirrors the
        // reference's own unchecked `expected_seq // 256` arithmetic.
        (self.expected_seq % 65536) as u16
    }

    /// Concatenate all received chunks in ascending sequence order, and
    /// report which sequence numbers below the highest received one are
    /// still missing. Returns `(vec![], vec![])` if nothing was received.
    pub fn reconstruct(&self) -> (Vec<u8>, Vec<u64>) {
        if self.received_chunks.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let mut message = Vec::new();
        for chunk in self.received_chunks.values() {
            message.extend_from_slice(chunk);
        }

        let highest = *self.received_chunks.keys().next_back().unwrap();
        let expected = highest + 1;
        let missing: Vec<u64> = (0..expected)
            .filter(|seq| !self.received_chunks.contains_key(seq))
            .collect();

        (message, missing)
    }

    pub fn expected_seq(&self) -> u64 {
        self.expected_seq
    }

    pub fn received_count(&self) -> usize {
        self.received_chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::Codec as AeadCodec;
    use crate::label_codec::encode_qname;

    const DOMAIN: &str = "tunnel.example.com";
    const KEY: [u8; 32] = [0x5au8; 32];

    fn encrypt_and_encode(seq: i64, plaintext: &[u8]) -> String {
        let codec = AeadCodec::new(&KEY);
        let packet = codec.seal(plaintext);
        encode_qname(seq, &packet.to_bytes(), DOMAIN).unwrap()
    }

    #[test]
    fn reset_clears_state_and_confirms() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        let qname = encode_qname(RESET_SEQ, &[], DOMAIN).unwrap();
        assert_eq!(session.process_query(&qname), ServerReply::ResetConfirmed);
        assert_eq!(session.expected_seq(), 0);
    }

    #[test]
    fn stores_chunk_and_advances_cursor() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        let qname = encrypt_and_encode(0, b"hello");
        assert_eq!(session.process_query(&qname), ServerReply::Ack(1));
        assert_eq!(session.expected_seq(), 1);
    }

    #[test]
    fn out_of_order_chunks_advance_only_when_contiguous() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        let q1 = encrypt_and_encode(1, b"second");
        assert_eq!(session.process_query(&q1), ServerReply::Ack(0)); // gap at 0
        let q0 = encrypt_and_encode(0, b"first");
        assert_eq!(session.process_query(&q0), ServerReply::Ack(2)); // fills gap, jumps to 2
    }

    #[test]
    fn duplicate_chunk_does_not_overwrite_and_returns_current_ack() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        let q0 = encrypt_and_encode(0, b"first");
        session.process_query(&q0);
        let q0_again = encrypt_and_encode(0, b"different-payload");
        assert_eq!(session.process_query(&q0_again), ServerReply::Ack(1));

        let (message, _) = session.reconstruct();
        assert_eq!(message, b"first"); // first write wins (I4)
    }

    #[test]
    fn stale_sequence_returns_current_ack_without_state_change() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        session.process_query(&encrypt_and_encode(0, b"a"));
        session.process_query(&encrypt_and_encode(1, b"b"));
        let before = session.received_count();
        assert_eq!(session.process_query(&encrypt_and_encode(0, b"stale")), ServerReply::Ack(2));
        assert_eq!(session.received_count(), before);
    }

    #[test]
    fn stale_sequence_with_malformed_body_still_returns_current_ack() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        session.process_query(&encrypt_and_encode(0, b"a"));
        session.process_query(&encrypt_and_encode(1, b"b"));

        // seq 0 is already stale (expected_seq = 2); R4 must fire before
        // the body is ever base32-decoded, so a garbage body doesn't turn
        // this into a NoAnswer.
        let qname = format!("seq0.0000000!.{DOMAIN}");
        assert_eq!(session.process_query(&qname), ServerReply::Ack(2));
        assert_eq!(session.received_count(), 2);
    }

    #[test]
    fn wrong_domain_suffix_yields_no_answer() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        assert_eq!(
            session.process_query("seq0.abcdefgh.not-the-right-domain.com"),
            ServerReply::NoAnswer
        );
    }

    #[test]
    fn tampered_packet_yields_no_answer_and_no_state_change() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        let mut qname = encrypt_and_encode(0, b"payload");
        // flip a character in a base32 label to corrupt the ciphertext
        qname = qname.replacen('a', "b", 1);
        let reply = session.process_query(&qname);
        assert!(matches!(reply, ServerReply::NoAnswer) || matches!(reply, ServerReply::Ack(0)));
        assert_eq!(session.expected_seq(), 0);
    }

    #[test]
    fn reconstruct_reports_gaps() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        session.process_query(&encrypt_and_encode(0, b"aa"));
        session.process_query(&encrypt_and_encode(1, b"bb"));
        session.process_query(&encrypt_and_encode(3, b"dd"));

        let (message, missing) = session.reconstruct();
        assert_eq!(message, b"aabbdd");
        assert_eq!(missing, vec![2]);
    }

    #[test]
    fn reconstruct_on_empty_session_is_empty() {
        let session = ServerSession::new(DOMAIN.to_string(), &KEY);
        assert_eq!(session.reconstruct(), (Vec::new(), Vec::new()));
    }

    #[test]
    fn ack_wraps_past_255_into_two_octets() {
        let mut session = ServerSession::new(DOMAIN.to_string(), &KEY);
        for seq in 0..260u64 {
            let qname = encrypt_and_encode(seq as i64, b"x");
            session.process_query(&qname);
        }
        assert_eq!(session.expected_seq(), 260);
        // B3: ack value still round-trips through the two-octet split
        let ack = session.current_ack();
        assert_eq!(ack, 260);
    }
}
