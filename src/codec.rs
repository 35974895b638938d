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

//! Wire-mode selection.
//!
//! A node speaks either the text encoding or the binary encoding, for
//! both the query protocol and the zone-transfer protocol, and the
//! choice is a runtime mode fixed at startup. Communicating peers must
//! be configured with the same mode; there is no negotiation. This
//! module dispatches encoding, decoding, and stream framing over that
//! mode so the rest of the crate never matches on it directly.

use crate::message::{self, Message, MessageError};
use crate::transfer::packet::{PacketError, TransferPacket};

////////////////////////////////////////////////////////////////////////
// WIRE MODES                                                         //
////////////////////////////////////////////////////////////////////////

/// The wire encoding a node speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireMode {
    /// The human-readable delimited text encoding.
    Text,
    /// The compact binary encoding.
    Binary,
}

impl WireMode {
    /// Encodes a query/response message.
    pub fn encode_message(self, message: &Message) -> Result<Vec<u8>, MessageError> {
        match self {
            Self::Text => Ok(message::text::encode(message).into_bytes()),
            Self::Binary => message::wire::encode(message),
        }
    }

    /// Decodes a query/response message from a complete datagram.
    pub fn decode_message(self, octets: &[u8]) -> Result<Message, MessageError> {
        match self {
            Self::Text => {
                let text = std::str::from_utf8(octets).map_err(|_| MessageError::BadUtf8)?;
                message::text::decode(text)
            }
            Self::Binary => message::wire::decode(octets),
        }
    }

    /// Encodes a zone-transfer packet as one stream frame. Text frames
    /// end with a newline; binary frames are length-implied.
    pub fn encode_packet(self, packet: &TransferPacket) -> Vec<u8> {
        match self {
            Self::Text => {
                let mut frame = packet.to_text().into_bytes();
                frame.push(b'\n');
                frame
            }
            Self::Binary => packet.to_wire(),
        }
    }

    /// Decodes a zone-transfer packet from one complete frame, as
    /// delimited by [`WireMode::split_frame`].
    pub fn decode_packet(self, frame: &[u8]) -> Result<TransferPacket, PacketError> {
        match self {
            Self::Text => {
                let text = std::str::from_utf8(frame).map_err(|_| PacketError::BadUtf8)?;
                TransferPacket::from_text(text.strip_suffix('\n').unwrap_or(text))
            }
            Self::Binary => TransferPacket::from_wire(frame),
        }
    }

    /// Finds the first complete frame in a growing stream buffer.
    ///
    /// Returns the length of the frame (including the delimiter in
    /// text mode) if one is complete, `None` if more bytes are needed,
    /// and an error if the buffer cannot start a valid frame. In the
    /// error case the stream is unrecoverable for binary mode, since
    /// the boundary of the bad frame is unknowable.
    pub fn split_frame(self, buffer: &[u8]) -> Result<Option<usize>, PacketError> {
        match self {
            Self::Text => Ok(buffer.iter().position(|&b| b == b'\n').map(|pos| pos + 1)),
            Self::Binary => match TransferPacket::read_wire(buffer) {
                Ok((_, consumed)) => Ok(Some(consumed)),
                Err(PacketError::Truncated) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
