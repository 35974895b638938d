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

//! Resource records.
//!
//! A [`Record`] is one authoritative fact: an owner name, a type, a
//! value whose syntax depends on the type, a TTL, and (for the types
//! that support it) a priority. Records are validated and normalized at
//! construction and immutable afterwards; zone installs replace them
//! wholesale rather than mutating them.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::name::{Name, NameError};

mod rr_type;
mod ttl;

pub use rr_type::{RecordType, UnknownRecordTypeError};
pub use ttl::Ttl;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A single resource record.
///
/// The constructors validate the value against the type's syntax and
/// normalize domain-valued fields (owner and, for the domain-valued
/// types, the value) to the canonical lowercase trailing-dot form. A
/// priority may only be supplied for the types that support one
/// ([`RecordType::supports_priority`]); for all other types it is
/// stored as zero.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Record {
    owner: Name,
    rtype: RecordType,
    value: String,
    ttl: Ttl,
    priority: u8,
}

impl Record {
    /// Creates a new record, validating the value against the type and
    /// the priority against the type's priority support.
    pub fn new(
        owner: Name,
        rtype: RecordType,
        value: &str,
        ttl: Ttl,
        priority: Option<u8>,
    ) -> Result<Self, RecordError> {
        let priority = match priority {
            Some(_) if !rtype.supports_priority() => {
                return Err(RecordError::PriorityNotSupported);
            }
            Some(p) => p,
            None => 0,
        };
        let value = validate_value(rtype, value)?;
        Ok(Self {
            owner,
            rtype,
            value,
            ttl,
            priority,
        })
    }

    /// Creates a new record from the textual form of each field, as
    /// they appear in zone files and in the text wire encoding.
    pub fn from_fields(
        owner: &str,
        rtype: &str,
        value: &str,
        ttl: &str,
        priority: Option<&str>,
    ) -> Result<Self, RecordError> {
        let owner = owner.parse().map_err(RecordError::InvalidOwner)?;
        let rtype = rtype.parse().map_err(|_| RecordError::UnknownType)?;
        let ttl = ttl
            .parse::<u32>()
            .map_err(|_| RecordError::InvalidTtl)?
            .into();
        let priority = match priority {
            None => None,
            Some(p) => Some(p.parse::<u8>().map_err(|_| RecordError::InvalidPriority)?),
        };
        Self::new(owner, rtype, value, ttl, priority)
    }

    /// Returns the record's owner name.
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Returns the record's type.
    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    /// Returns the record's value in its normalized textual form.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the record's TTL.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Returns the record's priority (zero for types that do not
    /// support one).
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// For domain-valued records, returns the value as a [`Name`].
    pub fn value_as_name(&self) -> Option<Name> {
        match self.rtype {
            RecordType::SoaOrigin
            | RecordType::Ns
            | RecordType::Cname
            | RecordType::Mx
            | RecordType::Ptr => self.value.parse().ok(),
            _ => None,
        }
    }

    /// For integer-valued records, returns the value as a `u32`.
    pub fn value_as_u32(&self) -> Option<u32> {
        match self.rtype {
            RecordType::SoaSerial
            | RecordType::SoaRefresh
            | RecordType::SoaRetry
            | RecordType::SoaExpire => self.value.parse().ok(),
            _ => None,
        }
    }
}

/// Validates and normalizes a record value against the type's syntax.
fn validate_value(rtype: RecordType, value: &str) -> Result<String, RecordError> {
    match rtype {
        RecordType::SoaOrigin
        | RecordType::Ns
        | RecordType::Cname
        | RecordType::Mx
        | RecordType::Ptr => {
            let name: Name = value.parse().map_err(RecordError::InvalidDomainValue)?;
            Ok(name.as_str().to_owned())
        }
        RecordType::A => {
            let addr: Ipv4Addr = value.parse().map_err(|_| RecordError::InvalidAddress)?;
            Ok(addr.to_string())
        }
        RecordType::SoaAdmin => {
            if value.is_empty()
                || !value.bytes().all(|b| {
                    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'%' | b'+' | b'-' | b'\\')
                })
            {
                Err(RecordError::InvalidAdmin)
            } else {
                Ok(value.to_owned())
            }
        }
        RecordType::SoaSerial
        | RecordType::SoaRefresh
        | RecordType::SoaRetry
        | RecordType::SoaExpire => {
            value
                .parse::<u32>()
                .map_err(|_| RecordError::InvalidInteger)?;
            Ok(value.to_owned())
        }
    }
}

impl fmt::Display for Record {
    /// Writes the record's text wire form:
    /// `<owner> <TYPE> <value> <ttl>[ <priority>]`, the priority field
    /// appearing only when it is nonzero.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {}", self.owner, self.rtype, self.value, self.ttl)?;
        if self.priority != 0 {
            write!(f, " {}", self.priority)?;
        }
        Ok(())
    }
}

impl FromStr for Record {
    type Err = RecordError;

    /// Parses the text wire form produced by [`Record`'s `Display`
    /// implementation](#impl-Display-for-Record). Surrounding
    /// whitespace is tolerated.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = text.split_whitespace();
        let owner = fields.next().ok_or(RecordError::BadSyntax)?;
        let rtype = fields.next().ok_or(RecordError::BadSyntax)?;
        let value = fields.next().ok_or(RecordError::BadSyntax)?;
        let ttl = fields.next().ok_or(RecordError::BadSyntax)?;
        let priority = fields.next();
        if fields.next().is_some() {
            return Err(RecordError::BadSyntax);
        }
        Self::from_fields(owner, rtype, value, ttl, priority)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Record`] could not be constructed or
/// parsed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RecordError {
    InvalidOwner(NameError),
    UnknownType,
    InvalidDomainValue(NameError),
    InvalidAddress,
    InvalidAdmin,
    InvalidInteger,
    InvalidTtl,
    InvalidPriority,
    PriorityNotSupported,
    BadSyntax,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidOwner(err) => write!(f, "invalid owner: {err}"),
            Self::UnknownType => f.write_str("unknown record type"),
            Self::InvalidDomainValue(err) => write!(f, "invalid domain-name value: {err}"),
            Self::InvalidAddress => f.write_str("value is not a valid IPv4 address"),
            Self::InvalidAdmin => f.write_str("value is not a valid administrator mailbox"),
            Self::InvalidInteger => f.write_str("value is not a valid unsigned integer"),
            Self::InvalidTtl => f.write_str("TTL is not a valid unsigned 32-bit integer"),
            Self::InvalidPriority => f.write_str("priority is not an integer between 0 and 255"),
            Self::PriorityNotSupported => {
                f.write_str("record type does not support a priority value")
            }
            Self::BadSyntax => f.write_str("record does not match <owner> <type> <value> <ttl>"),
        }
    }
}

impl std::error::Error for RecordError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_normalizes_domain_values() {
        let record = Record::new(
            "Example.COM".parse().unwrap(),
            RecordType::Ns,
            "NS1.Example.com",
            86400.into(),
            None,
        )
        .unwrap();
        assert_eq!(record.owner().as_str(), "example.com.");
        assert_eq!(record.value(), "ns1.example.com.");
        assert_eq!(record.priority(), 0);
    }

    #[test]
    fn construction_validates_values() {
        let owner: Name = "example.com.".parse().unwrap();
        assert_eq!(
            Record::new(owner.clone(), RecordType::A, "1.2.3.300", 60.into(), None),
            Err(RecordError::InvalidAddress),
        );
        assert_eq!(
            Record::new(
                owner.clone(),
                RecordType::SoaSerial,
                "not-a-number",
                60.into(),
                None,
            ),
            Err(RecordError::InvalidInteger),
        );
        assert!(Record::new(owner, RecordType::A, "1.2.3.4", 60.into(), None).is_ok());
    }

    #[test]
    fn priority_only_where_supported() {
        let owner: Name = "example.com.".parse().unwrap();
        assert_eq!(
            Record::new(
                owner.clone(),
                RecordType::Cname,
                "other.example.com.",
                60.into(),
                Some(3),
            ),
            Err(RecordError::PriorityNotSupported),
        );
        let mx = Record::new(owner, RecordType::Mx, "mail.example.com.", 60.into(), Some(10))
            .unwrap();
        assert_eq!(mx.priority(), 10);
    }

    #[test]
    fn text_form_round_trips() {
        let with_priority: Record = "example.com. MX mail.example.com. 86400 10"
            .parse()
            .unwrap();
        assert_eq!(
            with_priority.to_string(),
            "example.com. MX mail.example.com. 86400 10",
        );
        assert_eq!(
            with_priority.to_string().parse::<Record>().unwrap(),
            with_priority,
        );

        // A zero priority is omitted from the text form and restored as
        // zero on parse.
        let without_priority: Record = "www.example.com. A 192.0.2.1 300".parse().unwrap();
        assert_eq!(without_priority.to_string(), "www.example.com. A 192.0.2.1 300");
        assert_eq!(
            without_priority.to_string().parse::<Record>().unwrap(),
            without_priority,
        );
    }

    #[test]
    fn text_form_rejects_out_of_range_priority() {
        assert_eq!(
            "example.com. MX mail.example.com. 60 300".parse::<Record>(),
            Err(RecordError::InvalidPriority),
        );
    }

    #[test]
    fn text_form_rejects_extra_fields() {
        assert_eq!(
            "www.example.com. A 192.0.2.1 300 0 extra".parse::<Record>(),
            Err(RecordError::BadSyntax),
        );
    }
}
