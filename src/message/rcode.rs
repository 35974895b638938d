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

//! Implementation of the [`Rcode`] type.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// RCODES                                                             //
////////////////////////////////////////////////////////////////////////

/// The response code of a response message.
///
/// The protocol defines four codes. [`Rcode::NoError`] is a definitive
/// answer carrying data; [`Rcode::Referral`] is a non-final answer (no
/// data yet, but possibly a delegation to follow); [`Rcode::NxDomain`]
/// definitively states that the queried name does not exist; and
/// [`Rcode::FormatError`] reports a request the responder could not
/// process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Rcode {
    NoError,
    Referral,
    NxDomain,
    FormatError,
}

impl TryFrom<u8> for Rcode {
    type Error = InvalidRcodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NoError),
            1 => Ok(Self::Referral),
            2 => Ok(Self::NxDomain),
            3 => Ok(Self::FormatError),
            _ => Err(InvalidRcodeError),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::Referral => 1,
            Rcode::NxDomain => 2,
            Rcode::FormatError => 3,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// An error signaling that a value is not a valid [`Rcode`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InvalidRcodeError;

impl fmt::Display for InvalidRcodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("response code is not between 0 and 3")
    }
}

impl std::error::Error for InvalidRcodeError {}
