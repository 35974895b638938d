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

//! The zone database file parser.
//!
//! A zone file is line-oriented. Blank lines and lines starting with
//! `#` are ignored. A line of the form `<key> DEFAULT <value>` defines
//! a macro: every later occurrence of `<key>` in the file is replaced
//! by `<value>` before the line is interpreted. The macro `@` is the
//! zone origin and must be a full domain name; it must be defined
//! before any record line that needs completion.
//!
//! Every other line is a record: `<owner> <TYPE> <value> <ttl>
//! [<priority>]`. Owners of all types except `CNAME` and `PTR`, and
//! values of the domain-valued types `SOASP`, `NS`, and `PTR`, are
//! completed against the origin when they do not already end with the
//! label separator.

use std::fmt;
use std::io;
use std::path::Path;

use crate::name::Name;
use crate::rr::{Record, RecordError, RecordType};

////////////////////////////////////////////////////////////////////////
// PARSING                                                            //
////////////////////////////////////////////////////////////////////////

/// The parsed contents of a zone file.
#[derive(Clone, Debug)]
pub struct ZoneData {
    pub origin: Name,
    pub records: Vec<Record>,
}

/// Loads and parses a zone file from the file system.
pub fn load(path: &Path) -> Result<ZoneData, ZoneFileError> {
    let text = std::fs::read_to_string(path).map_err(ZoneFileError::Io)?;
    parse(&text)
}

/// Parses the text of a zone file.
pub fn parse(text: &str) -> Result<ZoneData, ZoneFileError> {
    let mut macros: Vec<(String, String)> = Vec::new();
    let mut records = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.get(1) == Some(&"DEFAULT") {
            if tokens.len() != 3 {
                return Err(ZoneFileError::BadLine { line });
            }
            if tokens[0] == "@" && tokens[2].parse::<Name>().is_err() {
                return Err(ZoneFileError::BadOrigin { line });
            }
            macros.push((tokens[0].to_owned(), tokens[2].to_owned()));
            continue;
        }

        let mut expanded = trimmed.to_owned();
        for (key, value) in &macros {
            expanded = expanded.replace(key, value);
        }

        let tokens: Vec<&str> = expanded.split_whitespace().collect();
        let (owner, rtype_text, value, ttl, priority) = match tokens.as_slice() {
            [o, t, v, ttl] => (*o, *t, *v, *ttl, None),
            [o, t, v, ttl, p] => (*o, *t, *v, *ttl, Some(*p)),
            _ => return Err(ZoneFileError::BadLine { line }),
        };

        let rtype: RecordType = rtype_text
            .parse()
            .map_err(|_| ZoneFileError::BadRecord {
                line,
                err: RecordError::UnknownType,
            })?;

        let owner = if completes_owner(rtype) {
            complete(owner, &macros, line)?
        } else {
            owner.to_owned()
        };
        let value = if completes_value(rtype) {
            complete(value, &macros, line)?
        } else {
            value.to_owned()
        };

        let record = Record::from_fields(&owner, rtype_text, &value, ttl, priority)
            .map_err(|err| ZoneFileError::BadRecord { line, err })?;
        records.push(record);
    }

    let origin: Name = origin_of(&macros)
        .ok_or(ZoneFileError::MissingOrigin { line: text.lines().count() })?
        .parse()
        .map_err(|_| ZoneFileError::BadOrigin { line: 0 })?;
    Ok(ZoneData { origin, records })
}

/// The types whose owners are completed against the origin.
fn completes_owner(rtype: RecordType) -> bool {
    !matches!(rtype, RecordType::Cname | RecordType::Ptr)
}

/// The types whose values are completed against the origin.
fn completes_value(rtype: RecordType) -> bool {
    matches!(
        rtype,
        RecordType::SoaOrigin | RecordType::Ns | RecordType::Ptr,
    )
}

fn origin_of(macros: &[(String, String)]) -> Option<&str> {
    macros
        .iter()
        .find(|(key, _)| key == "@")
        .map(|(_, value)| value.as_str())
}

/// Completes a partial domain name against the origin: `www` becomes
/// `www.<origin>`. Names already ending with the separator are left
/// alone.
fn complete(
    name: &str,
    macros: &[(String, String)],
    line: usize,
) -> Result<String, ZoneFileError> {
    if name.ends_with('.') {
        return Ok(name.to_owned());
    }
    let origin = origin_of(macros).ok_or(ZoneFileError::MissingOrigin { line })?;
    if origin == "." {
        Ok(format!("{name}."))
    } else {
        Ok(format!("{name}.{origin}"))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error from loading or parsing a zone file.
#[derive(Debug)]
pub enum ZoneFileError {
    Io(io::Error),
    BadLine { line: usize },
    BadOrigin { line: usize },
    MissingOrigin { line: usize },
    BadRecord { line: usize, err: RecordError },
}

impl fmt::Display for ZoneFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read zone file: {err}"),
            Self::BadLine { line } => write!(
                f,
                "line {line} does not match <owner> <type> <value> <ttl> [<priority>]",
            ),
            Self::BadOrigin { line } => {
                write!(f, "line {line}: origin (@) is not a valid full domain name")
            }
            Self::MissingOrigin { line } => {
                write!(f, "line {line}: origin (@) has not been defined")
            }
            Self::BadRecord { line, err } => write!(f, "line {line}: {err}"),
        }
    }
}

impl std::error::Error for ZoneFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::BadRecord { err, .. } => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_ZONE: &str = "\
# example.com. zone database
@ DEFAULT example.com.
TTL DEFAULT 86400

@ SOASP ns1 TTL
@ SOAADMIN admin\\.mail.example.com. TTL
@ SOASERIAL 2022112001 TTL
@ SOAREFRESH 120 TTL
@ SOARETRY 30 TTL
@ SOAEXPIRE 3600 TTL
@ NS ns1 TTL
ns1 A 192.0.2.53 TTL
www A 192.0.2.1 300
@ MX mail TTL 10
mail A 192.0.2.25 TTL
";

    #[test]
    fn a_complete_zone_parses() {
        let zone = parse(EXAMPLE_ZONE).unwrap();
        assert_eq!(zone.origin.as_str(), "example.com.");
        assert_eq!(zone.records.len(), 11);

        let soasp = &zone.records[0];
        assert_eq!(soasp.owner().as_str(), "example.com.");
        assert_eq!(soasp.value(), "ns1.example.com.");
        assert_eq!(soasp.ttl().as_secs(), 86400);

        let www = zone
            .records
            .iter()
            .find(|r| r.owner().as_str() == "www.example.com.")
            .unwrap();
        assert_eq!(www.value(), "192.0.2.1");
        assert_eq!(www.ttl().as_secs(), 300);

        let mx = zone
            .records
            .iter()
            .find(|r| r.rtype() == RecordType::Mx)
            .unwrap();
        assert_eq!(mx.priority(), 10);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let zone = parse("@ DEFAULT x.\n# nothing\n\n@ SOASERIAL 1 60\n").unwrap();
        assert_eq!(zone.records.len(), 1);
    }

    #[test]
    fn records_needing_completion_require_an_origin() {
        assert!(matches!(
            parse("www A 192.0.2.1 300\n"),
            Err(ZoneFileError::MissingOrigin { line: 1 }),
        ));
    }

    #[test]
    fn a_file_without_an_origin_is_rejected() {
        assert!(matches!(
            parse("www.example.com. A 192.0.2.1 300\n"),
            Err(ZoneFileError::MissingOrigin { .. }),
        ));
    }

    #[test]
    fn a_bad_origin_is_rejected() {
        assert!(matches!(
            parse("@ DEFAULT not a name\n"),
            Err(ZoneFileError::BadLine { line: 1 }),
        ));
        assert!(matches!(
            parse("@ DEFAULT bad_name.\n"),
            Err(ZoneFileError::BadOrigin { line: 1 }),
        ));
    }

    #[test]
    fn malformed_lines_carry_their_line_number() {
        assert!(matches!(
            parse("@ DEFAULT example.com.\n@ SOASERIAL 1 60\nwww A\n"),
            Err(ZoneFileError::BadLine { line: 3 }),
        ));
        assert!(matches!(
            parse("@ DEFAULT example.com.\nwww A not-an-address 300\n"),
            Err(ZoneFileError::BadRecord {
                line: 2,
                err: RecordError::InvalidAddress,
            }),
        ));
    }
}
