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

//! Query and response messages.
//!
//! A [`Message`] is either a query or a response; the two carry
//! different payloads, so the type is a tagged variant rather than a
//! struct with conditionally meaningful fields. The [`text`] and
//! [`wire`] submodules implement the two wire encodings; which one a
//! node speaks is a runtime mode (see [`codec`](crate::codec)), not a
//! per-message property.

use std::fmt;

use crate::name::{Name, NameError};
use crate::rr::RecordError;

mod question;
mod rcode;
pub mod text;
pub mod wire;

pub use question::{QueryInfo, QueryResponse};
pub use rcode::{InvalidRcodeError, Rcode};

////////////////////////////////////////////////////////////////////////
// MESSAGES                                                           //
////////////////////////////////////////////////////////////////////////

/// The lowest valid message id.
pub const MIN_ID: u16 = 1;

/// The highest valid message id.
pub const MAX_ID: u16 = 65356;

/// A protocol message: a query or a response to one.
///
/// A response echoes the id and [`QueryInfo`] of the query it answers.
/// The recursion flag means "recursion desired" on a query and
/// "recursion available" on a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    Query {
        id: u16,
        info: QueryInfo,
        recursion_desired: bool,
    },
    Response {
        id: u16,
        info: QueryInfo,
        response: QueryResponse,
        rcode: Rcode,
        recursion_available: bool,
    },
}

impl Message {
    /// Creates a query message, validating the id range.
    pub fn query(id: u16, info: QueryInfo, recursion_desired: bool) -> Result<Self, MessageError> {
        if !(MIN_ID..=MAX_ID).contains(&id) {
            return Err(MessageError::IdOutOfRange(id as u32));
        }
        Ok(Self::Query {
            id,
            info,
            recursion_desired,
        })
    }

    /// Builds the response to this message carrying `response`. The
    /// response code is derived: a final answer with values is
    /// [`Rcode::NoError`], a final answer without values is
    /// [`Rcode::NxDomain`], and a non-final answer is
    /// [`Rcode::Referral`].
    pub fn respond(&self, response: QueryResponse, recursion_available: bool) -> Self {
        let rcode = if response.is_final() {
            if response.values().is_empty() {
                Rcode::NxDomain
            } else {
                Rcode::NoError
            }
        } else {
            Rcode::Referral
        };
        Self::Response {
            id: self.id(),
            info: self.info().clone(),
            response,
            rcode,
            recursion_available,
        }
    }

    /// Builds an error response ([`Rcode::FormatError`]) to this
    /// message.
    pub fn error_response(&self, recursion_available: bool) -> Self {
        Self::Response {
            id: self.id(),
            info: self.info().clone(),
            response: QueryResponse::empty(),
            rcode: Rcode::FormatError,
            recursion_available,
        }
    }

    /// Builds an error response for a message that could not even be
    /// decoded, so no id or query can be echoed.
    pub fn decode_failure_response(recursion_available: bool) -> Self {
        Self::Response {
            id: MIN_ID,
            info: QueryInfo::new(Name::root(), crate::rr::RecordType::A),
            response: QueryResponse::empty(),
            rcode: Rcode::FormatError,
            recursion_available,
        }
    }

    /// Returns the message id.
    pub fn id(&self) -> u16 {
        match *self {
            Self::Query { id, .. } | Self::Response { id, .. } => id,
        }
    }

    /// Returns the query information.
    pub fn info(&self) -> &QueryInfo {
        match self {
            Self::Query { info, .. } | Self::Response { info, .. } => info,
        }
    }

    /// Returns whether this message is a query.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    /// The R flag: recursion desired on queries, recursion available
    /// on responses.
    fn recursion_flag(&self) -> bool {
        match *self {
            Self::Query {
                recursion_desired, ..
            } => recursion_desired,
            Self::Response {
                recursion_available,
                ..
            } => recursion_available,
        }
    }

    /// The A flag: always clear on queries, the response's
    /// authoritative flag otherwise.
    fn authoritative_flag(&self) -> bool {
        match self {
            Self::Query { .. } => false,
            Self::Response { response, .. } => response.is_authoritative(),
        }
    }

    /// Returns the response code ([`Rcode::NoError`] for queries).
    fn rcode(&self) -> Rcode {
        match self {
            Self::Query { .. } => Rcode::NoError,
            Self::Response { rcode, .. } => *rcode,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Message`] could not be decoded (or, for
/// a handful of variants, encoded).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageError {
    /// The input ended before the message did.
    Truncated,
    /// A string field is not valid UTF-8.
    BadUtf8,
    /// The header does not have the expected shape.
    BadHeader,
    /// The id is outside `[MIN_ID, MAX_ID]`.
    IdOutOfRange(u32),
    /// The response code is outside `[0, 3]`.
    BadRcode(u8),
    /// A flag token is not one of `Q`, `R`, `A`.
    BadFlags,
    /// A flag letter appears more than once.
    DuplicateFlag(char),
    /// The queried name is not a valid domain name.
    InvalidName(NameError),
    /// The record type (name or ordinal) is unknown.
    UnknownType,
    /// An entry block does not have the expected shape.
    BadBlock,
    /// A record failed to parse or validate.
    BadRecord(RecordError),
    /// Input remained after the end of the message.
    TrailingData,
    /// A record list is too long for its one-byte count field.
    TooManyRecords,
}

impl From<RecordError> for MessageError {
    fn from(err: RecordError) -> Self {
        Self::BadRecord(err)
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Truncated => f.write_str("unexpected end of message"),
            Self::BadUtf8 => f.write_str("string field is not valid UTF-8"),
            Self::BadHeader => f.write_str("malformed message header"),
            Self::IdOutOfRange(id) => {
                write!(f, "message id {id} is not between {MIN_ID} and {MAX_ID}")
            }
            Self::BadRcode(v) => write!(f, "response code {v} is not between 0 and 3"),
            Self::BadFlags => f.write_str("malformed flags field"),
            Self::DuplicateFlag(c) => write!(f, "flag {c} appears more than once"),
            Self::InvalidName(err) => write!(f, "invalid query name: {err}"),
            Self::UnknownType => f.write_str("unknown record type"),
            Self::BadBlock => f.write_str("malformed entry block"),
            Self::BadRecord(err) => write!(f, "invalid record: {err}"),
            Self::TrailingData => f.write_str("unexpected data after end of message"),
            Self::TooManyRecords => f.write_str("too many records for one message"),
        }
    }
}

impl std::error::Error for MessageError {}
