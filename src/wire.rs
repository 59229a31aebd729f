//! Raw DNS message construction and parsing.
//!
//! Header and question/answer section bytes are written by hand rather
//! than through a DNS parsing crate — the message shape here is fixed
//! and simple enough not to need one. The question section carries an
//! ordinary dotted QNAME (length-prefixed labels, produced from a `&str`
//! by [`encode_dns_name`]); the answer section is a single A record
//! carrying the cumulative ACK in its four address octets.

use crate::error::TransportError;

const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;

/// Encode a dotted name into DNS wire format: length-prefixed labels
/// terminated by a zero-length label.
fn encode_dns_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// Decode a (possibly pointer-free) dotted name starting at `pos`, returning
/// the name and the position just past its terminating zero label.
fn decode_dns_name(packet: &[u8], mut pos: usize) -> Result<(String, usize), TransportError> {
    let mut labels = Vec::new();
    loop {
        let len = *packet
            .get(pos)
            .ok_or_else(|| TransportError::Malformed("truncated name".into()))? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xc0 == 0xc0 {
            // Compression pointer: present in replies we synthesize
            // ourselves with `name_start`, never in agent-originated
            // queries. Two-byte pointer, no further labels follow it.
            pos += 2;
            return Ok((labels.join("."), pos));
        }
        pos += 1;
        let label = packet
            .get(pos..pos + len)
            .ok_or_else(|| TransportError::Malformed("label exceeds packet".into()))?;
        labels.push(
            std::str::from_utf8(label)
                .map_err(|_| TransportError::Malformed("non-utf8 label".into()))?
                .to_string(),
        );
        pos += len;
    }
    Ok((labels.join("."), pos))
}

/// Build a standard recursive DNS query for `qname`'s A record.
pub fn build_query(transaction_id: u16, qname: &str) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&transaction_id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // flags: standard query, recursion desired
    packet.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    packet.extend_from_slice(&encode_dns_name(qname));
    packet.extend_from_slice(&TYPE_A.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet
}

/// Parse a query built by [`build_query`], returning `(transaction_id, qname)`.
pub fn parse_query(packet: &[u8]) -> Result<(u16, String), TransportError> {
    if packet.len() < 12 {
        return Err(TransportError::Malformed("packet shorter than dns header".into()));
    }
    let transaction_id = u16::from_be_bytes([packet[0], packet[1]]);
    let (qname, _) = decode_dns_name(packet, 12)?;
    Ok((transaction_id, qname))
}

/// Build a response carrying `ack` as an A record `1.2.<hi>.<lo>`, where
/// `hi`/`lo` are `ack`'s big-endian octets.
/// `query` is echoed back verbatim in the question section, as a resolver
/// answering its own recursive query would.
pub fn build_ack_response(query: &[u8], ack: u16) -> Result<Vec<u8>, TransportError> {
    if query.len() < 12 {
        return Err(TransportError::Malformed("query shorter than dns header".into()));
    }
    let transaction_id = u16::from_be_bytes([query[0], query[1]]);
    let (_, name_end) = decode_dns_name(query, 12)?;
    let question_end = name_end + 4; // QTYPE + QCLASS

    let mut packet = Vec::new();
    packet.extend_from_slice(&transaction_id.to_be_bytes());
    packet.extend_from_slice(&[0x81, 0x80]); // flags: standard response, recursion available
    packet.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    packet.extend_from_slice(&[0x00, 0x01]); // ANCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    packet.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    packet.extend_from_slice(&query[12..question_end.min(query.len())]);

    let [hi, lo] = ack.to_be_bytes();
    packet.extend_from_slice(&[0xc0, 0x0c]); // NAME: pointer to question
    packet.extend_from_slice(&TYPE_A.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x3c]); // TTL: 60
    packet.extend_from_slice(&[0x00, 0x04]); // RDLENGTH
    packet.extend_from_slice(&[1, 2, hi, lo]); // RDATA: the A record itself

    Ok(packet)
}

/// Parse an [`build_ack_response`]-shaped reply, returning the ACK value
/// carried in the answer's low two address octets. Returns `None` if the
/// response carries no answer record, mirroring the server's R5 "silently
/// drop" policy as observed from the agent's side.
pub fn parse_ack_response(packet: &[u8]) -> Result<Option<u16>, TransportError> {
    if packet.len() < 12 {
        return Err(TransportError::Malformed("packet shorter than dns header".into()));
    }
    let ancount = u16::from_be_bytes([packet[6], packet[7]]);
    if ancount == 0 {
        return Ok(None);
    }

    let (_, mut pos) = decode_dns_name(packet, 12)?;
    pos += 4; // QTYPE + QCLASS

    // NAME (pointer or inline), TYPE, CLASS, TTL
    let (_, after_name) = decode_dns_name(packet, pos)?;
    pos = after_name + 8;

    let rdlength = u16::from_be_bytes(
        packet
            .get(pos..pos + 2)
            .ok_or_else(|| TransportError::Malformed("truncated rdlength".into()))?
            .try_into()
            .unwrap(),
    ) as usize;
    pos += 2;

    let rdata = packet
        .get(pos..pos + rdlength)
        .ok_or_else(|| TransportError::Malformed("rdata exceeds packet".into()))?;
    if rdata.len() != 4 {
        return Err(TransportError::Malformed("A record is not 4 bytes".into()));
    }
    Ok(Some(u16::from_be_bytes([rdata[2], rdata[3]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_round_trips() {
        let packet = build_query(0xbeef, "seq3.abcdefgh.tunnel.example.com");
        let (tid, qname) = parse_query(&packet).unwrap();
        assert_eq!(tid, 0xbeef);
        assert_eq!(qname, "seq3.abcdefgh.tunnel.example.com");
    }

    #[test]
    fn ack_response_round_trips() {
        let query = build_query(0x1234, "seq0.abcd.tunnel.example.com");
        let response = build_ack_response(&query, 300).unwrap();
        let ack = parse_ack_response(&response).unwrap();
        assert_eq!(ack, Some(300));
    }

    #[test]
    fn ack_response_preserves_transaction_id() {
        let query = build_query(0x9999, "seq1.ab.tunnel.example.com");
        let response = build_ack_response(&query, 1).unwrap();
        assert_eq!(&response[0..2], &[0x99, 0x99]);
    }

    #[test]
    fn rejects_truncated_packet() {
        assert!(parse_query(&[0u8; 4]).is_err());
    }
}
