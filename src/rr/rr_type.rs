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

//! Provides the [`RecordType`] enumeration.

use std::fmt;
use std::str::FromStr;

use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// RECORD TYPES                                                       //
////////////////////////////////////////////////////////////////////////

/// The type of a [`Record`](super::Record).
///
/// This protocol uses a fixed, closed set of record types, so unlike
/// real DNS implementations we can model them as an enumeration rather
/// than an open integer newtype. The six `Soa*` types carry the fields
/// that real DNS packs into a single SOA record; each appears as its
/// own record with its own value.
///
/// Every type has a stable wire ordinal (the discriminant below), used
/// by the binary encodings.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum RecordType {
    /// Name of the zone's primary server (`SOASP`).
    SoaOrigin = 0,
    /// Mailbox of the zone's administrator (`SOAADMIN`).
    SoaAdmin = 1,
    /// Version number of the zone's data (`SOASERIAL`).
    SoaSerial = 2,
    /// Seconds between secondary refresh attempts (`SOAREFRESH`).
    SoaRefresh = 3,
    /// Seconds between retries of a failed refresh (`SOARETRY`).
    SoaRetry = 4,
    /// Seconds until a secondary's copy goes stale (`SOAEXPIRE`).
    SoaExpire = 5,
    /// Delegation of a subdomain to another server (`NS`).
    Ns = 6,
    /// IPv4 address of a host (`A`).
    A = 7,
    /// Alias for another domain name (`CNAME`).
    Cname = 8,
    /// Mail exchange for a domain (`MX`).
    Mx = 9,
    /// Reverse mapping (`PTR`).
    Ptr = 10,
}

impl RecordType {
    /// All record types, in wire-ordinal order.
    pub const ALL: [RecordType; 11] = [
        Self::SoaOrigin,
        Self::SoaAdmin,
        Self::SoaSerial,
        Self::SoaRefresh,
        Self::SoaRetry,
        Self::SoaExpire,
        Self::Ns,
        Self::A,
        Self::Cname,
        Self::Mx,
        Self::Ptr,
    ];

    /// Returns the type's wire ordinal.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Looks a type up by its wire ordinal.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Returns whether records of this type carry a priority value.
    pub fn supports_priority(self) -> bool {
        matches!(self, Self::Ns | Self::A | Self::Mx)
    }

    /// Returns the type's textual name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SoaOrigin => "SOASP",
            Self::SoaAdmin => "SOAADMIN",
            Self::SoaSerial => "SOASERIAL",
            Self::SoaRefresh => "SOAREFRESH",
            Self::SoaRetry => "SOARETRY",
            Self::SoaExpire => "SOAEXPIRE",
            Self::Ns => "NS",
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Ptr => "PTR",
        }
    }
}

impl FromStr for RecordType {
    type Err = UnknownRecordTypeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|rtype| Caseless(rtype.as_str()) == Caseless(text))
            .copied()
            .ok_or(UnknownRecordTypeError)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error signaling that a string does not name a [`RecordType`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct UnknownRecordTypeError;

impl fmt::Display for UnknownRecordTypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("unknown record type")
    }
}

impl std::error::Error for UnknownRecordTypeError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
