//! # Node Codec
//!
//! Wire format for membership entry payloads.
//!
//! A node record is a length-delimited record of tagged fields in the
//! usual varint key encoding (`key = field << 3 | wire_type`):
//!
//! - field 1, varint: node id (sign-extended to 64 bits when negative)
//! - field 2, length-delimited: UTF-8 url
//! - field 3, repeated varint: partitions
//!
//! Field 4 carried the availability flag in the legacy schema. The slot
//! stays reserved: encode never writes it and decode skips it through
//! the generic unknown-field path, so availability is always derived
//! from the availability tree, never from the payload. Unknown trailing
//! fields are skipped the same way, which keeps old and new readers
//! compatible.
//!
//! Decode accepts partitions both unpacked (one tagged varint per
//! element) and packed (a single length-delimited run of varints);
//! encode always emits the unpacked form.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ClusterError, Node, Result};

const FIELD_ID: u32 = 1;
const FIELD_URL: u32 = 2;
const FIELD_PARTITIONS: u32 = 3;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

/// Encodes a node record for storage as a membership entry payload.
///
/// The `available` bit is intentionally not written; see the module
/// docs.
pub fn encode(node: &Node) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + node.url.len() + node.partitions.len() * 2);

    put_key(&mut buf, FIELD_ID, WIRE_VARINT);
    put_varint(&mut buf, node.id as i64 as u64);

    put_key(&mut buf, FIELD_URL, WIRE_LENGTH_DELIMITED);
    put_varint(&mut buf, node.url.len() as u64);
    buf.put_slice(node.url.as_bytes());

    for &partition in &node.partitions {
        put_key(&mut buf, FIELD_PARTITIONS, WIRE_VARINT);
        put_varint(&mut buf, partition as i64 as u64);
    }

    buf.freeze()
}

/// Decodes a membership entry payload back into a node record.
///
/// The returned node always has `available == false`; availability is
/// derived from the availability tree by the caller. Fails with
/// [`ClusterError::MalformedNode`] on a truncated or structurally
/// invalid buffer, and on a record missing its id or url.
pub fn decode(payload: &[u8]) -> Result<Node> {
    let mut buf = payload;
    let mut id: Option<i32> = None;
    let mut url: Option<String> = None;
    let mut partitions = Vec::new();

    while !buf.is_empty() {
        let key = get_varint(&mut buf)?;
        let field = (key >> 3) as u32;
        let wire = (key & 0x7) as u32;

        match (field, wire) {
            (FIELD_ID, WIRE_VARINT) => {
                id = Some(get_varint(&mut buf)? as i32);
            }
            (FIELD_URL, WIRE_LENGTH_DELIMITED) => {
                let raw = get_length_delimited(&mut buf)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| ClusterError::malformed("url is not valid UTF-8"))?;
                url = Some(text.to_owned());
            }
            (FIELD_PARTITIONS, WIRE_VARINT) => {
                partitions.push(get_varint(&mut buf)? as i32);
            }
            (FIELD_PARTITIONS, WIRE_LENGTH_DELIMITED) => {
                let mut packed = get_length_delimited(&mut buf)?;
                while !packed.is_empty() {
                    partitions.push(get_varint(&mut packed)? as i32);
                }
            }
            (_, wire) => skip_field(&mut buf, wire)?,
        }
    }

    let id = id.ok_or_else(|| ClusterError::malformed("record is missing the node id"))?;
    let url = url.ok_or_else(|| ClusterError::malformed("record is missing the node url"))?;
    Node::new(id, url, partitions).map_err(|e| ClusterError::malformed(e.to_string()))
}

fn put_key(buf: &mut BytesMut, field: u32, wire: u32) {
    put_varint(buf, u64::from(field << 3 | wire));
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn get_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let &byte = buf
            .first()
            .ok_or_else(|| ClusterError::malformed("truncated varint"))?;
        *buf = &buf[1..];
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ClusterError::malformed("varint exceeds ten bytes"))
}

fn get_length_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = get_varint(buf)? as usize;
    if buf.len() < len {
        return Err(ClusterError::malformed("truncated length-delimited field"));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn skip_field(buf: &mut &[u8], wire: u32) -> Result<()> {
    match wire {
        WIRE_VARINT => {
            get_varint(buf)?;
        }
        WIRE_FIXED64 => {
            if buf.len() < 8 {
                return Err(ClusterError::malformed("truncated fixed64 field"));
            }
            *buf = &buf[8..];
        }
        WIRE_LENGTH_DELIMITED => {
            get_length_delimited(buf)?;
        }
        WIRE_FIXED32 => {
            if buf.len() < 4 {
                return Err(ClusterError::malformed("truncated fixed32 field"));
            }
            *buf = &buf[4..];
        }
        other => {
            return Err(ClusterError::malformed(format!(
                "unsupported wire type {other}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::new(1, "localhost:31313", vec![0, 1, 2]).unwrap()
    }

    #[test]
    fn round_trip() {
        let node = sample();
        let decoded = decode(&encode(&node)).unwrap();
        assert_eq!(decoded.id, node.id);
        assert_eq!(decoded.url, node.url);
        assert_eq!(decoded.partitions, node.partitions);
        assert!(!decoded.available);
    }

    #[test]
    fn availability_is_not_on_the_wire() {
        let node = sample().with_availability(true);
        let decoded = decode(&encode(&node)).unwrap();
        assert!(!decoded.available);
    }

    #[test]
    fn empty_partitions_decode_to_empty() {
        let node = Node::new(7, "localhost:31320", vec![]).unwrap();
        let decoded = decode(&encode(&node)).unwrap();
        assert!(decoded.partitions.is_empty());
    }

    #[test]
    fn duplicate_partitions_are_preserved() {
        let node = Node::new(7, "localhost:31320", vec![3, 3, 5]).unwrap();
        let decoded = decode(&encode(&node)).unwrap();
        assert_eq!(decoded.partitions, vec![3, 3, 5]);
    }

    #[test]
    fn negative_id_round_trips() {
        let node = Node::new(-4, "localhost:31313", vec![1]).unwrap();
        let decoded = decode(&encode(&node)).unwrap();
        assert_eq!(decoded.id, -4);
    }

    #[test]
    fn unknown_trailing_fields_are_ignored() {
        let mut payload = BytesMut::from(&encode(&sample())[..]);
        // legacy availability slot: field 4, varint 1
        put_key(&mut payload, 4, WIRE_VARINT);
        put_varint(&mut payload, 1);
        // an unrelated future field: field 9, length-delimited
        put_key(&mut payload, 9, WIRE_LENGTH_DELIMITED);
        put_varint(&mut payload, 3);
        payload.put_slice(b"xyz");

        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.url, "localhost:31313");
        assert!(!decoded.available);
    }

    #[test]
    fn packed_partitions_are_accepted() {
        let mut payload = BytesMut::new();
        put_key(&mut payload, FIELD_ID, WIRE_VARINT);
        put_varint(&mut payload, 2);
        put_key(&mut payload, FIELD_URL, WIRE_LENGTH_DELIMITED);
        put_varint(&mut payload, 15);
        payload.put_slice(b"localhost:31314");
        let mut packed = BytesMut::new();
        put_varint(&mut packed, 2);
        put_varint(&mut packed, 3);
        put_key(&mut payload, FIELD_PARTITIONS, WIRE_LENGTH_DELIMITED);
        put_varint(&mut payload, packed.len() as u64);
        payload.put_slice(&packed);

        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded.partitions, vec![2, 3]);
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        let payload = encode(&sample());
        let truncated = &payload[..payload.len() - 4];
        assert!(matches!(
            decode(truncated),
            Err(ClusterError::MalformedNode { .. })
        ));
    }

    #[test]
    fn missing_url_is_malformed() {
        let mut payload = BytesMut::new();
        put_key(&mut payload, FIELD_ID, WIRE_VARINT);
        put_varint(&mut payload, 1);
        assert!(matches!(
            decode(&payload),
            Err(ClusterError::MalformedNode { .. })
        ));
    }

    #[test]
    fn invalid_utf8_url_is_malformed() {
        let mut payload = BytesMut::new();
        put_key(&mut payload, FIELD_ID, WIRE_VARINT);
        put_varint(&mut payload, 1);
        put_key(&mut payload, FIELD_URL, WIRE_LENGTH_DELIMITED);
        put_varint(&mut payload, 2);
        payload.put_slice(&[0xff, 0xfe]);
        assert!(matches!(
            decode(&payload),
            Err(ClusterError::MalformedNode { .. })
        ));
    }

    #[test]
    fn unsupported_wire_type_is_malformed() {
        // field 12 with deprecated group wire type 3
        let mut payload = BytesMut::from(&encode(&sample())[..]);
        put_key(&mut payload, 12, 3);
        assert!(matches!(
            decode(&payload),
            Err(ClusterError::MalformedNode { .. })
        ));
    }
}
