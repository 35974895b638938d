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

//! The human-readable text encoding of [`Message`]s.
//!
//! A message starts with the header
//! `id,flags,rcode,nvalues,nauthorities,nextra;name,TYPE;` where
//! `flags` is the `+`-joined subset of `Q` (query), `R` (recursion),
//! and `A` (authoritative) that applies. A response then carries three
//! entry blocks (values, authorities, extra values): each block starts
//! on a new line, lists its records joined by `,\n`, and closes with
//! `;`. An empty block is the two characters `\n;`.

use std::fmt::Write;

use super::{Message, MessageError, QueryInfo, QueryResponse, Rcode};
use crate::rr::Record;

////////////////////////////////////////////////////////////////////////
// ENCODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Encodes a message in the text form.
pub fn encode(message: &Message) -> String {
    let (nvalues, nauthorities, nextra) = match message {
        Message::Query { .. } => (0, 0, 0),
        Message::Response { response, .. } => (
            response.values().len(),
            response.authorities().len(),
            response.extra_values().len(),
        ),
    };

    let mut out = String::new();
    write!(
        out,
        "{},{},{},{},{},{};{};",
        message.id(),
        flags_to_string(message),
        message.rcode(),
        nvalues,
        nauthorities,
        nextra,
        message.info(),
    )
    .unwrap();

    if let Message::Response { response, .. } = message {
        write_block(&mut out, response.values());
        write_block(&mut out, response.authorities());
        write_block(&mut out, response.extra_values());
    }

    out
}

fn flags_to_string(message: &Message) -> String {
    let mut letters = Vec::new();
    if message.is_query() {
        letters.push("Q");
    }
    if message.recursion_flag() {
        letters.push("R");
    }
    if message.authoritative_flag() {
        letters.push("A");
    }
    letters.join("+")
}

fn write_block(out: &mut String, records: &[Record]) {
    out.push('\n');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        write!(out, "{record}").unwrap();
    }
    out.push(';');
}

////////////////////////////////////////////////////////////////////////
// DECODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Decodes a message from the text form. The entire input must be
/// consumed; anything left after the final `;` is an error.
pub fn decode(text: &str) -> Result<Message, MessageError> {
    let (header, rest) = text.split_once(';').ok_or(MessageError::BadHeader)?;
    let mut fields = header.split(',');
    let id = fields.next().ok_or(MessageError::BadHeader)?;
    let flags = fields.next().ok_or(MessageError::BadHeader)?;
    let rcode = fields.next().ok_or(MessageError::BadHeader)?;
    let nvalues = fields.next().ok_or(MessageError::BadHeader)?;
    let nauthorities = fields.next().ok_or(MessageError::BadHeader)?;
    let nextra = fields.next().ok_or(MessageError::BadHeader)?;
    if fields.next().is_some() {
        return Err(MessageError::BadHeader);
    }

    let id: u32 = id.parse().map_err(|_| MessageError::BadHeader)?;
    if !(super::MIN_ID as u32..=super::MAX_ID as u32).contains(&id) {
        return Err(MessageError::IdOutOfRange(id));
    }
    let id = id as u16;

    let (flag_q, flag_r, flag_a) = parse_flags(flags)?;
    let rcode_raw: u8 = rcode.parse().map_err(|_| MessageError::BadHeader)?;
    let rcode = Rcode::try_from(rcode_raw).map_err(|_| MessageError::BadRcode(rcode_raw))?;
    let nvalues: usize = nvalues.parse().map_err(|_| MessageError::BadHeader)?;
    let nauthorities: usize = nauthorities.parse().map_err(|_| MessageError::BadHeader)?;
    let nextra: usize = nextra.parse().map_err(|_| MessageError::BadHeader)?;

    let (question, rest) = rest.split_once(';').ok_or(MessageError::BadHeader)?;
    let (name, rtype) = question.split_once(',').ok_or(MessageError::BadHeader)?;
    let name = name.parse().map_err(MessageError::InvalidName)?;
    let rtype = rtype.parse().map_err(|_| MessageError::UnknownType)?;
    let info = QueryInfo::new(name, rtype);

    if flag_q {
        if !rest.is_empty() {
            return Err(MessageError::TrailingData);
        }
        Ok(Message::Query {
            id,
            info,
            recursion_desired: flag_r,
        })
    } else {
        let (values, rest) = read_block(rest, nvalues)?;
        let (authorities, rest) = read_block(rest, nauthorities)?;
        let (extra_values, rest) = read_block(rest, nextra)?;
        if !rest.is_empty() {
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
}

/// Parses the flags field into its `(Q, R, A)` bits. An empty field is
/// valid; a duplicated letter is not.
fn parse_flags(flags: &str) -> Result<(bool, bool, bool), MessageError> {
    let (mut q, mut r, mut a) = (false, false, false);
    if flags.is_empty() {
        return Ok((q, r, a));
    }
    for token in flags.split('+') {
        let (seen, letter) = match token {
            "Q" => (&mut q, 'Q'),
            "R" => (&mut r, 'R'),
            "A" => (&mut a, 'A'),
            _ => return Err(MessageError::BadFlags),
        };
        if *seen {
            return Err(MessageError::DuplicateFlag(letter));
        }
        *seen = true;
    }
    Ok((q, r, a))
}

/// Reads one entry block of exactly `expected` records, returning the
/// records and the input remaining after the block's closing `;`.
fn read_block(text: &str, expected: usize) -> Result<(Vec<Record>, &str), MessageError> {
    let mut rest = text.strip_prefix('\n').ok_or(MessageError::BadBlock)?;

    if expected == 0 {
        let rest = rest.strip_prefix(';').ok_or(MessageError::BadBlock)?;
        return Ok((Vec::new(), rest));
    }

    let mut records = Vec::with_capacity(expected);
    for i in 0..expected {
        if i > 0 {
            rest = rest.strip_prefix('\n').ok_or(MessageError::BadBlock)?;
        }
        let last = i + 1 == expected;
        let end = rest
            .find(|c| c == ',' || c == ';')
            .ok_or(MessageError::BadBlock)?;
        let terminator = if last { b';' } else { b',' };
        if rest.as_bytes()[end] != terminator {
            return Err(MessageError::BadBlock);
        }
        records.push(rest[..end].parse()?);
        rest = &rest[end + 1..];
    }
    Ok((records, rest))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::RecordType;

    fn info(name: &str, rtype: RecordType) -> QueryInfo {
        QueryInfo::new(name.parse().unwrap(), rtype)
    }

    fn record(text: &str) -> Record {
        text.parse().unwrap()
    }

    #[test]
    fn query_encoding_is_exact() {
        let message =
            Message::query(300, info("www.example.com.", RecordType::A), true).unwrap();
        assert_eq!(encode(&message), "300,Q+R,0,0,0,0;www.example.com.,A;");
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn response_encoding_is_exact() {
        let query = Message::query(17, info("www.example.com.", RecordType::A), false).unwrap();
        let response = query.respond(
            QueryResponse::new(
                vec![record("www.example.com. A 192.0.2.1 300")],
                vec![record("example.com. NS ns1.example.com. 86400")],
                vec![record("ns1.example.com. A 192.0.2.53 86400")],
                false,
                true,
            ),
            true,
        );
        let expected = "17,R+A,0,1,1,1;www.example.com.,A;\
                        \nwww.example.com. A 192.0.2.1 300;\
                        \nexample.com. NS ns1.example.com. 86400;\
                        \nns1.example.com. A 192.0.2.53 86400;";
        assert_eq!(encode(&response), expected);
        assert_eq!(decode(expected).unwrap(), response);
    }

    #[test]
    fn empty_blocks_round_trip() {
        let query = Message::query(9, info("missing.example.com.", RecordType::Mx), true).unwrap();
        let response = query.respond(
            QueryResponse::new(Vec::new(), Vec::new(), Vec::new(), true, true),
            false,
        );
        let encoded = encode(&response);
        assert_eq!(encoded, "9,A,2,0,0,0;missing.example.com.,MX;\n;\n;\n;");
        assert_eq!(decode(&encoded).unwrap(), response);
    }

    #[test]
    fn multiple_records_in_a_block_round_trip() {
        let query = Message::query(5, info("example.com.", RecordType::Ns), true).unwrap();
        let response = query.respond(
            QueryResponse::new(
                vec![record("example.com. NS ns1.example.com. 86400")],
                Vec::new(),
                vec![
                    record("ns1.example.com. A 192.0.2.53 86400"),
                    record("ns1.example.com. A 192.0.2.54 86400"),
                ],
                false,
                false,
            ),
            true,
        );
        let encoded = encode(&response);
        assert!(encoded.contains("192.0.2.53 86400,\nns1.example.com. A 192.0.2.54"));
        assert_eq!(decode(&encoded).unwrap(), response);
    }

    #[test]
    fn duplicate_flags_are_rejected() {
        assert_eq!(
            decode("300,Q+Q,0,0,0,0;www.example.com.,A;"),
            Err(MessageError::DuplicateFlag('Q')),
        );
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert_eq!(
            decode("300,Q+X,0,0,0,0;www.example.com.,A;"),
            Err(MessageError::BadFlags),
        );
    }

    #[test]
    fn trailing_data_is_rejected() {
        assert_eq!(
            decode("300,Q+R,0,0,0,0;www.example.com.,A;extra"),
            Err(MessageError::TrailingData),
        );
    }

    #[test]
    fn id_out_of_range_is_rejected() {
        assert_eq!(
            decode("65357,Q,0,0,0,0;www.example.com.,A;"),
            Err(MessageError::IdOutOfRange(65357)),
        );
        assert_eq!(
            decode("0,Q,0,0,0,0;www.example.com.,A;"),
            Err(MessageError::IdOutOfRange(0)),
        );
    }

    #[test]
    fn response_code_out_of_range_is_rejected() {
        assert_eq!(
            decode("300,,4,0,0,0;www.example.com.,A;\n;\n;\n;"),
            Err(MessageError::BadRcode(4)),
        );
    }

    #[test]
    fn short_block_is_rejected() {
        // The header promises one value but the block is empty, so the
        // empty text before the terminator fails to parse as a record.
        assert_eq!(
            decode("300,,0,1,0,0;www.example.com.,A;\n;\n;\n;"),
            Err(MessageError::BadRecord(crate::rr::RecordError::BadSyntax)),
        );
    }
}
