// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The compact binary encoding of [`Message`]s.
//!
//! Fixed-width fields are little-endian; strings are UTF-8 followed by
//! a single `0x00` terminator. The header is two bytes of `id - 1`,
//! one flag byte (`isQuery << 4 | recursion << 3 | authoritative << 2 |
//! rcode`), and one count byte each for values, authorities, and extra
//! values; then the terminated query name and one type-ordinal byte;
//! then, for responses, the serialized records of the three lists in
//! order.

use super::{Message, MessageError, QueryInfo, QueryResponse, Rcode};
use crate::rr::{Record, RecordType, Ttl};

////////////////////////////////////////////////////////////////////////
// ENCODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Encodes a message in the binary form. Fails if the id is out of
/// range or a record list is too long for its one-byte count field.
pub fn encode(message: &Message) -> Result<Vec<u8>, MessageError> {
    if !(super::MIN_ID..=super::MAX_ID).contains(&message.id()) {
        return Err(MessageError::IdOutOfRange(message.id() as u32));
    }
    let empty: &[Record] = &[];
    let (values, authorities, extra_values) = match message {
        Message::Query { .. } => (empty, empty, empty),
        Message::Response { response, .. } => (
            response.values(),
            response.authorities(),
            response.extra_values(),
        ),
    };
    for list in [values, authorities, extra_values] {
        if list.len() > u8::MAX as usize {
            return Err(MessageError::TooManyRecords);
        }
    }

    let flags = (message.is_query() as u8) << 4
        | (message.recursion_flag() as u8) << 3
        | (message.authoritative_flag() as u8) << 2
        | u8::from(message.rcode());

    let mut out = Vec::new();
    out.extend_from_slice(&(message.id() - 1).to_le_bytes());
    out.push(flags);
    out.push(values.len() as u8);
    out.push(authorities.len() as u8);
    out.push(extra_values.len() as u8);
    write_string(&mut out, message.info().name.as_str());
    out.push(message.info().rtype.ordinal());
    for record in values.iter().chain(authorities).chain(extra_values) {
        write_record(&mut out, record);
    }
    Ok(out)
}

/// Appends a record in its binary form: terminated owner, type
/// ordinal, terminated value, four TTL bytes, and a trailing priority
/// byte iff the type supports one.
pub(crate) fn write_record(out: &mut Vec<u8>, record: &Record) {
    write_string(out, record.owner().as_str());
    out.push(record.rtype().ordinal());
    write_string(out, record.value());
    out.extend_from_slice(&record.ttl().as_secs().to_le_bytes());
    if record.rtype().supports_priority() {
        out.push(record.priority());
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

////////////////////////////////////////////////////////////////////////
// DECODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Decodes a message from the binary form. The entire input must be
/// consumed.
pub fn decode(octets: &[u8]) -> Result<Message, MessageError> {
    let id_raw = read_u16(octets, 0)? as u32;
    let id = id_raw + 1;
    if id > super::MAX_ID as u32 {
        return Err(MessageError::IdOutOfRange(id));
    }
    let id = id as u16;

    let flags = read_u8(octets, 2)?;
    let flag_q = flags & 0b1_0000 != 0;
    let flag_r = flags & 0b0_1000 != 0;
    let flag_a = flags & 0b0_0100 != 0;
    // Two bits always yield a valid rcode.
    let rcode = Rcode::try_from(flags & 0b0_0011).unwrap();

    let nvalues = read_u8(octets, 3)? as usize;
    let nauthorities = read_u8(octets, 4)? as usize;
    let nextra = read_u8(octets, 5)? as usize;

    let (name, mut pos) = read_string(octets, 6)?;
    let name = name.parse().map_err(MessageError::InvalidName)?;
    let rtype =
        RecordType::from_ordinal(read_u8(octets, pos)?).ok_or(MessageError::UnknownType)?;
    pos += 1;
    let info = QueryInfo::new(name, rtype);

    if flag_q {
        if pos != octets.len() {
            return Err(MessageError::TrailingData);
        }
        return Ok(Message::Query {
            id,
            info,
            recursion_desired: flag_r,
        });
    }

    let mut read_list = |pos: &mut usize, count: usize| -> Result<Vec<Record>, MessageError> {
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let (record, next) = read_record(octets, *pos)?;
            records.push(record);
            *pos = next;
        }
        Ok(records)
    };
    let values = read_list(&mut pos, nvalues)?;
    let authorities = read_list(&mut pos, nauthorities)?;
    let extra_values = read_list(&mut pos, nextra)?;
    if pos != octets.len() {
        return Err(MessageError::TrailingData);
    }

    let response = QueryResponse::new(
        values,
        authorities,
        extra_values,
        rcode == Rcode::NxDomain,
        flag_a,
    );
    Ok(Message::Response {
        id,
        info,
        response,
        rcode,
        recursion_available: flag_r,
    })
}

/// Reads a record in its binary form starting at `pos`, returning the
/// record and the position just past it.
pub(crate) fn read_record(octets: &[u8], pos: usize) -> Result<(Record, usize), MessageError> {
    let (owner, pos) = read_string(octets, pos)?;
    let owner = owner
        .parse()
        .map_err(|e| MessageError::BadRecord(crate::rr::RecordError::InvalidOwner(e)))?;
    let rtype = RecordType::from_ordinal(read_u8(octets, pos)?).ok_or(MessageError::UnknownType)?;
    let (value, pos) = read_string(octets, pos + 1)?;
    let ttl = Ttl::from(read_u32(octets, pos)?);
    let mut pos = pos + 4;
    let priority = if rtype.supports_priority() {
        let p = read_u8(octets, pos)?;
        pos += 1;
        Some(p)
    } else {
        None
    };
    let record = Record::new(owner, rtype, &value, ttl, priority)?;
    Ok((record, pos))
}

fn read_u8(octets: &[u8], pos: usize) -> Result<u8, MessageError> {
    octets.get(pos).copied().ok_or(MessageError::Truncated)
}

fn read_u16(octets: &[u8], pos: usize) -> Result<u16, MessageError> {
    let array = octets
        .get(pos..pos + 2)
        .ok_or(MessageError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(array))
}

fn read_u32(octets: &[u8], pos: usize) -> Result<u32, MessageError> {
    let array = octets
        .get(pos..pos + 4)
        .ok_or(MessageError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(array))
}

/// Reads a `0x00`-terminated UTF-8 string starting at `pos`, returning
/// the string and the position just past the terminator.
fn read_string(octets: &[u8], pos: usize) -> Result<(String, usize), MessageError> {
    let tail = octets.get(pos..).ok_or(MessageError::Truncated)?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(MessageError::Truncated)?;
    let s = std::str::from_utf8(&tail[..len]).map_err(|_| MessageError::BadUtf8)?;
    Ok((s.to_owned(), pos + len + 1))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, rtype: RecordType) -> QueryInfo {
        QueryInfo::new(name.parse().unwrap(), rtype)
    }

    fn record(text: &str) -> Record {
        text.parse().unwrap()
    }

    #[test]
    fn query_layout_is_exact() {
        let message = Message::query(2, info("example.com.", RecordType::Ns), true).unwrap();
        let encoded = encode(&message).unwrap();
        let expected: &[u8] = b"\x01\x00\x18\x00\x00\x00example.com.\x00\x06";
        assert_eq!(encoded, expected);
        assert_eq!(decode(&encoded).unwrap(), message);
    }

    #[test]
    fn response_round_trips() {
        let query = Message::query(1234, info("www.example.com.", RecordType::A), true).unwrap();
        let response = query.respond(
            QueryResponse::new(
                vec![record("www.example.com. A 192.0.2.1 300 2")],
                vec![record("example.com. NS ns1.example.com. 86400")],
                vec![record("ns1.example.com. A 192.0.2.53 86400")],
                false,
                true,
            ),
            true,
        );
        let encoded = encode(&response).unwrap();
        assert_eq!(decode(&encoded).unwrap(), response);
    }

    #[test]
    fn negative_response_round_trips() {
        let query = Message::query(77, info("missing.example.com.", RecordType::Mx), true).unwrap();
        let response = query.respond(
            QueryResponse::new(Vec::new(), Vec::new(), Vec::new(), true, true),
            false,
        );
        let encoded = encode(&response).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, response);
        match decoded {
            Message::Response { rcode, .. } => assert_eq!(rcode, Rcode::NxDomain),
            Message::Query { .. } => panic!("decoded as a query"),
        }
    }

    #[test]
    fn truncation_is_detected_at_every_prefix() {
        let query = Message::query(1234, info("www.example.com.", RecordType::A), true).unwrap();
        let response = query.respond(
            QueryResponse::new(
                vec![record("www.example.com. A 192.0.2.1 300")],
                Vec::new(),
                Vec::new(),
                false,
                false,
            ),
            true,
        );
        let encoded = encode(&response).unwrap();
        for len in 0..encoded.len() {
            assert!(
                decode(&encoded[..len]).is_err(),
                "prefix of {len} bytes decoded successfully",
            );
        }
    }

    #[test]
    fn unknown_type_ordinal_is_rejected() {
        let message = Message::query(2, info("example.com.", RecordType::Ns), false).unwrap();
        let mut encoded = encode(&message).unwrap();
        *encoded.last_mut().unwrap() = 11;
        assert_eq!(decode(&encoded), Err(MessageError::UnknownType));
    }

    #[test]
    fn id_out_of_range_is_rejected() {
        let message = Message::query(2, info("example.com.", RecordType::Ns), false).unwrap();
        let mut encoded = encode(&message).unwrap();
        encoded[0] = 0xff;
        encoded[1] = 0xff;
        assert_eq!(decode(&encoded), Err(MessageError::IdOutOfRange(65536)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let message = Message::query(2, info("example.com.", RecordType::Ns), false).unwrap();
        let mut encoded = encode(&message).unwrap();
        encoded.push(0);
        assert_eq!(decode(&encoded), Err(MessageError::TrailingData));
    }
}
