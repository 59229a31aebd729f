//! Bijective mapping between a `(sequence, packet)` pair and a DNS QNAME.
//!
//! Wire grammar: `seq<N>.<L1>.<L2>…<Lk>.<domain>`, where `<N>` is a signed
//! decimal integer (`-1` is the reset sentinel) and `concat(L1..Lk)`
//! uppercased and base32-decoded yields `nonce(16) ‖ tag(16) ‖
//! ciphertext(variable)`. The reset QNAME carries the single literal
//! intermediate label `reset` in place of a base32 body.
//!
//! Pure functions, no I/O dependencies — encoding and decoding are testable
//! without a socket.

use data_encoding::BASE32_NOPAD;

use crate::error::CodecError;

/// RFC 1035 per-label octet limit.
pub const MAX_LABEL_LEN: usize = 63;

/// RFC 1035 overall QNAME octet limit.
pub const MAX_QNAME_LEN: usize = 253;

/// Sentinel sequence number identifying the reset control message.
pub const RESET_SEQ: i64 = -1;

/// Encode `(seq, packet)` into a QNAME under `domain`.
///
/// For `seq == RESET_SEQ`, `packet` is ignored and the canonical
/// `seq-1.reset.<domain>` QNAME is produced.
pub fn encode_qname(seq: i64, packet: &[u8], domain: &str) -> Result<String, CodecError> {
    if seq == RESET_SEQ {
        let qname = format!("seq-1.reset.{domain}");
        if qname.len() > MAX_QNAME_LEN {
            return Err(CodecError::QnameTooLong);
        }
        return Ok(qname);
    }

    let body = BASE32_NOPAD.encode(packet).to_lowercase();

    let mut qname = format!("seq{seq}.");
    for (i, chunk) in body.as_bytes().chunks(MAX_LABEL_LEN).enumerate() {
        if i > 0 {
            qname.push('.');
        }
        // base32's alphabet is pure ASCII, so this is always valid UTF-8.
        qname.push_str(std::str::from_utf8(chunk).expect("base32 output is ascii"));
    }
    qname.push('.');
    qname.push_str(domain);

    if qname.len() > MAX_QNAME_LEN {
        return Err(CodecError::QnameTooLong);
    }
    Ok(qname)
}

/// Strip the configured domain suffix off a QNAME (R1), returning what's
/// left of it.
fn strip_domain<'a>(qname: &'a str, domain: &str) -> Result<&'a str, CodecError> {
    qname
        .strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .ok_or(CodecError::SuffixMismatch)
}

/// Parse just the sequence number out of a QNAME (R1, R2), without
/// touching the body labels at all.
///
/// Split out so callers can apply the R4 stale-sequence check before ever
/// base32-decoding a query's body — matching `server.py`'s own check
/// order, which tests `seq_num < expected_seq` (server.py:52) before its
/// base32 decode (server.py:59-63).
pub fn parse_seq(qname: &str, domain: &str) -> Result<i64, CodecError> {
    let without_domain = strip_domain(qname, domain)?;
    let seq_label = without_domain
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(CodecError::SuffixMismatch)?;
    let seq = parse_seq_label(seq_label)?; // R2
    if seq < 0 && seq != RESET_SEQ {
        return Err(CodecError::BadSeqLabel(seq_label.to_string()));
    }
    Ok(seq)
}

/// Decode a QNAME's body labels into the raw packet bytes: concat the
/// intermediate labels (no separators), uppercase, base32-decode.
///
/// Does not enforce the 32-byte nonce+tag floor itself — matching
/// `server.py`'s own separate `base64.b32decode(...)` and
/// `len(full_packet) < 32` steps; callers apply that floor themselves
/// (see [`decode_qname`] and `ServerSession::process_query`'s R5).
pub fn decode_body(qname: &str, domain: &str) -> Result<Vec<u8>, CodecError> {
    let without_domain = strip_domain(qname, domain)?;
    for label in without_domain.split('.').skip(1) {
        if label.len() > MAX_LABEL_LEN {
            return Err(CodecError::LabelTooLong);
        }
    }

    // concat(L1..Lk), no separators, then base32-decode. BASE32_NOPAD's
    // decoder accepts exactly this unpadded form; it is equivalent to the
    // reference's "uppercase, right-pad with '=' to a multiple of 8, then
    // base32-decode" recipe.
    let body: String = without_domain.split('.').skip(1).collect::<Vec<_>>().join("");
    let packet = BASE32_NOPAD.decode(body.to_uppercase().as_bytes())?;
    Ok(packet)
}

/// Decode a full QNAME back into `(seq, packet)`, including the 32-byte
/// nonce+tag floor check.
///
/// Returns `(RESET_SEQ, Vec::new())` for the reset sentinel without
/// inspecting the intermediate labels any further than the sequence
/// label itself — matching the server resolver's R3, which acts on the
/// sequence number alone.
///
/// A convenience wrapper around [`parse_seq`] and [`decode_body`] for
/// callers that want the whole thing in one call (the agent side, tests);
/// `ServerSession::process_query` calls the two steps separately so R4 can
/// run before the body is ever touched.
pub fn decode_qname(qname: &str, domain: &str) -> Result<(i64, Vec<u8>), CodecError> {
    let seq = parse_seq(qname, domain)?;
    if seq == RESET_SEQ {
        return Ok((RESET_SEQ, Vec::new()));
    }
    let packet = decode_body(qname, domain)?;
    if packet.len() < 32 {
        return Err(CodecError::PacketTooShort(packet.len()));
    }
    Ok((seq, packet))
}

fn parse_seq_label(label: &str) -> Result<i64, CodecError> {
    let rest = label
        .strip_prefix("seq")
        .ok_or_else(|| CodecError::BadSeqLabel(label.to_string()))?;
    rest.parse::<i64>()
        .map_err(|_| CodecError::BadSeqLabel(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "tunnel.example.com";

    #[test]
    fn round_trips_a_data_packet() {
        let packet = vec![0x42u8; 32 + 13];
        let qname = encode_qname(7, &packet, DOMAIN).unwrap();
        assert!(qname.starts_with("seq7."));
        assert!(qname.ends_with(DOMAIN));

        let (seq, decoded) = decode_qname(&qname, DOMAIN).unwrap();
        assert_eq!(seq, 7);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn reset_sentinel_round_trips() {
        let qname = encode_qname(RESET_SEQ, &[], DOMAIN).unwrap();
        assert_eq!(qname, format!("seq-1.reset.{DOMAIN}"));

        let (seq, packet) = decode_qname(&qname, DOMAIN).unwrap();
        assert_eq!(seq, RESET_SEQ);
        assert!(packet.is_empty());
    }

    #[test]
    fn splits_long_bodies_across_multiple_labels() {
        let packet = vec![0xabu8; 200];
        let qname = encode_qname(0, &packet, DOMAIN).unwrap();
        let labels: Vec<&str> = qname.split('.').collect();
        // seq0 + at least 2 base32 labels + 3 domain labels
        assert!(labels.len() > 1 + 3);
        for label in &labels {
            assert!(label.len() <= MAX_LABEL_LEN);
        }
        assert!(qname.len() <= MAX_QNAME_LEN);
    }

    #[test]
    fn rejects_wrong_suffix() {
        let err = decode_qname("seq0.abcdefgh.other.domain", DOMAIN).unwrap_err();
        assert!(matches!(err, CodecError::SuffixMismatch));
    }

    #[test]
    fn rejects_malformed_seq_label() {
        let qname = format!("notaseq.abcdefgh.{DOMAIN}");
        let err = decode_qname(&qname, DOMAIN).unwrap_err();
        assert!(matches!(err, CodecError::BadSeqLabel(_)));
    }

    #[test]
    fn rejects_packet_shorter_than_nonce_plus_tag() {
        let packet = vec![0u8; 10]; // well under the 32-byte nonce+tag floor
        let qname = encode_qname(0, &packet, DOMAIN).unwrap();
        let err = decode_qname(&qname, DOMAIN).unwrap_err();
        assert!(matches!(err, CodecError::PacketTooShort(_)));
    }

    #[test]
    fn rejects_bad_base32_alphabet() {
        let qname = format!("seq0.0000000!.{DOMAIN}");
        let err = decode_qname(&qname, DOMAIN).unwrap_err();
        assert!(matches!(err, CodecError::Base32(_)));
    }

    #[test]
    fn parse_seq_succeeds_even_when_body_is_malformed() {
        let qname = format!("seq3.0000000!.{DOMAIN}");
        assert_eq!(parse_seq(&qname, DOMAIN).unwrap(), 3);
        assert!(decode_body(&qname, DOMAIN).is_err());
    }

    #[test]
    fn decode_body_does_not_enforce_the_nonce_tag_floor() {
        let packet = vec![0u8; 10]; // under the 32-byte floor
        let qname = encode_qname(0, &packet, DOMAIN).unwrap();
        assert_eq!(decode_body(&qname, DOMAIN).unwrap(), packet);
    }
}
