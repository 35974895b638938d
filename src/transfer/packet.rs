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

//! Zone-transfer packets.
//!
//! The transfer protocol runs six stages over one stream; each frame
//! carries one [`TransferPacket`]. The packet is a tagged variant per
//! stage, since the payloads differ: stages 0 and 2 carry a zone name,
//! stage 1 a serial, stage 3 a count, stage 4 a zone name and a count,
//! and stage 5 either one `(ordinal, record)` pair (on success) or
//! nothing (when the primary refuses the transfer).
//!
//! The text form is `(stage,status,payload)`; the binary form is a
//! single header byte `stage << 2 | status` followed by the payload
//! with the usual field encodings (little-endian integers,
//! `0x00`-terminated strings).

use std::fmt;

use crate::message::{wire, MessageError};
use crate::name::{Name, NameError};
use crate::rr::{Record, RecordError};

////////////////////////////////////////////////////////////////////////
// STATUSES                                                           //
////////////////////////////////////////////////////////////////////////

/// The status a primary reports in its replies.
///
/// Requests always travel with [`TransferStatus::Success`]; the
/// primary's replies report how the request fared.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransferStatus {
    Success,
    Unauthorized,
    NoSuchZone,
    BadRequest,
}

impl TryFrom<u8> for TransferStatus {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, PacketError> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unauthorized),
            2 => Ok(Self::NoSuchZone),
            3 => Ok(Self::BadRequest),
            _ => Err(PacketError::BadStatus(value)),
        }
    }
}

impl From<TransferStatus> for u8 {
    fn from(status: TransferStatus) -> Self {
        match status {
            TransferStatus::Success => 0,
            TransferStatus::Unauthorized => 1,
            TransferStatus::NoSuchZone => 2,
            TransferStatus::BadRequest => 3,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::NoSuchZone => f.write_str("no such zone"),
            Self::BadRequest => f.write_str("bad request"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PACKETS                                                            //
////////////////////////////////////////////////////////////////////////

/// One frame of the zone-transfer protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferPacket {
    /// Stage 0 (secondary): what is your serial for this zone?
    SerialQuery { zone: Name },
    /// Stage 1 (primary): the zone's serial, or an error status.
    Serial { status: TransferStatus, serial: u32 },
    /// Stage 2 (secondary): how many records will you send?
    CountQuery { zone: Name },
    /// Stage 3 (primary): the record count, or an error status.
    Count { status: TransferStatus, count: u16 },
    /// Stage 4 (secondary): acknowledges the count and requests the
    /// records.
    CountAck { zone: Name, count: u16 },
    /// Stage 5 (primary): one record, with its 0-based position.
    EntryData { ordinal: u16, record: Record },
    /// Stage 5 (primary): the transfer is refused.
    EntryDenied { status: TransferStatus },
}

impl TransferPacket {
    /// Returns the packet's protocol stage.
    pub fn stage(&self) -> u8 {
        match self {
            Self::SerialQuery { .. } => 0,
            Self::Serial { .. } => 1,
            Self::CountQuery { .. } => 2,
            Self::Count { .. } => 3,
            Self::CountAck { .. } => 4,
            Self::EntryData { .. } | Self::EntryDenied { .. } => 5,
        }
    }

    /// Returns the packet's status (requests and data packets travel
    /// with [`TransferStatus::Success`]).
    pub fn status(&self) -> TransferStatus {
        match self {
            Self::Serial { status, .. }
            | Self::Count { status, .. }
            | Self::EntryDenied { status } => *status,
            _ => TransferStatus::Success,
        }
    }

    ////////////////////////////////////////////////////////////////////
    // TEXT ENCODING                                                  //
    ////////////////////////////////////////////////////////////////////

    /// Encodes the packet in its text form (without the framing
    /// newline, which belongs to the stream layer).
    pub fn to_text(&self) -> String {
        let status = u8::from(self.status());
        match self {
            Self::SerialQuery { zone } => format!("(0,{status},{zone})"),
            Self::Serial { serial, .. } => format!("(1,{status},{serial})"),
            Self::CountQuery { zone } => format!("(2,{status},{zone})"),
            Self::Count { count, .. } => format!("(3,{status},{count})"),
            Self::CountAck { zone, count } => format!("(4,{status},{zone},{count})"),
            Self::EntryData { ordinal, record } => format!("(5,{status},({ordinal},{record}))"),
            Self::EntryDenied { .. } => format!("(5,{status},)"),
        }
    }

    /// Decodes a packet from its text form.
    pub fn from_text(text: &str) -> Result<Self, PacketError> {
        let inner = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .ok_or(PacketError::BadSyntax)?;
        let (stage, rest) = inner.split_once(',').ok_or(PacketError::BadSyntax)?;
        let (status, payload) = rest.split_once(',').ok_or(PacketError::BadSyntax)?;
        let stage: u8 = stage.parse().map_err(|_| PacketError::BadSyntax)?;
        let status_raw: u8 = status.parse().map_err(|_| PacketError::BadSyntax)?;
        let status = TransferStatus::try_from(status_raw)?;

        match stage {
            0 => Ok(Self::SerialQuery {
                zone: parse_name(payload)?,
            }),
            1 => Ok(Self::Serial {
                status,
                serial: payload.parse().map_err(|_| PacketError::BadInteger)?,
            }),
            2 => Ok(Self::CountQuery {
                zone: parse_name(payload)?,
            }),
            3 => Ok(Self::Count {
                status,
                count: payload.parse().map_err(|_| PacketError::BadInteger)?,
            }),
            4 => {
                let (zone, count) = payload.split_once(',').ok_or(PacketError::BadSyntax)?;
                Ok(Self::CountAck {
                    zone: parse_name(zone)?,
                    count: count.parse().map_err(|_| PacketError::BadInteger)?,
                })
            }
            5 => {
                if status != TransferStatus::Success {
                    if !payload.is_empty() {
                        return Err(PacketError::BadSyntax);
                    }
                    return Ok(Self::EntryDenied { status });
                }
                let pair = payload
                    .strip_prefix('(')
                    .and_then(|t| t.strip_suffix(')'))
                    .ok_or(PacketError::BadSyntax)?;
                let (ordinal, record) = pair.split_once(',').ok_or(PacketError::BadSyntax)?;
                Ok(Self::EntryData {
                    ordinal: ordinal.parse().map_err(|_| PacketError::BadInteger)?,
                    record: record.parse().map_err(PacketError::BadRecord)?,
                })
            }
            _ => Err(PacketError::BadStage(stage)),
        }
    }

    ////////////////////////////////////////////////////////////////////
    // BINARY ENCODING                                                //
    ////////////////////////////////////////////////////////////////////

    /// Encodes the packet in its binary form.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = vec![self.stage() << 2 | u8::from(self.status())];
        match self {
            Self::SerialQuery { zone } | Self::CountQuery { zone } => {
                out.extend_from_slice(zone.as_str().as_bytes());
                out.push(0);
            }
            Self::Serial { serial, .. } => out.extend_from_slice(&serial.to_le_bytes()),
            Self::Count { count, .. } => out.extend_from_slice(&count.to_le_bytes()),
            Self::CountAck { zone, count } => {
                out.extend_from_slice(zone.as_str().as_bytes());
                out.push(0);
                out.extend_from_slice(&count.to_le_bytes());
            }
            Self::EntryData { ordinal, record } => {
                out.extend_from_slice(&ordinal.to_le_bytes());
                wire::write_record(&mut out, record);
            }
            Self::EntryDenied { .. } => (),
        }
        out
    }

    /// Decodes a packet from the beginning of `octets`, returning it
    /// together with the number of bytes consumed. The binary form is
    /// length-implied, so this is also how the stream layer finds
    /// frame boundaries: [`PacketError::Truncated`] means "wait for
    /// more bytes".
    pub fn read_wire(octets: &[u8]) -> Result<(Self, usize), PacketError> {
        let header = *octets.first().ok_or(PacketError::Truncated)?;
        let stage = header >> 2;
        // Two bits always yield a valid status.
        let status = TransferStatus::try_from(header & 0b11).unwrap();

        match stage {
            0 | 2 => {
                let (zone, pos) = read_name(octets, 1)?;
                let packet = if stage == 0 {
                    Self::SerialQuery { zone }
                } else {
                    Self::CountQuery { zone }
                };
                Ok((packet, pos))
            }
            1 => {
                let serial = read_u32(octets, 1)?;
                Ok((Self::Serial { status, serial }, 5))
            }
            3 => {
                let count = read_u16(octets, 1)?;
                Ok((Self::Count { status, count }, 3))
            }
            4 => {
                let (zone, pos) = read_name(octets, 1)?;
                let count = read_u16(octets, pos)?;
                Ok((Self::CountAck { zone, count }, pos + 2))
            }
            5 => {
                if status != TransferStatus::Success {
                    return Ok((Self::EntryDenied { status }, 1));
                }
                let ordinal = read_u16(octets, 1)?;
                let (record, pos) = wire::read_record(octets, 3)?;
                Ok((Self::EntryData { ordinal, record }, pos))
            }
            _ => Err(PacketError::BadStage(stage)),
        }
    }

    /// Decodes a packet from a complete binary frame; trailing bytes
    /// are an error.
    pub fn from_wire(octets: &[u8]) -> Result<Self, PacketError> {
        let (packet, consumed) = Self::read_wire(octets)?;
        if consumed != octets.len() {
            return Err(PacketError::TrailingData);
        }
        Ok(packet)
    }
}

fn parse_name(text: &str) -> Result<Name, PacketError> {
    text.parse().map_err(PacketError::BadName)
}

fn read_name(octets: &[u8], pos: usize) -> Result<(Name, usize), PacketError> {
    let tail = octets.get(pos..).ok_or(PacketError::Truncated)?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::Truncated)?;
    let text = std::str::from_utf8(&tail[..len]).map_err(|_| PacketError::BadUtf8)?;
    Ok((parse_name(text)?, pos + len + 1))
}

fn read_u16(octets: &[u8], pos: usize) -> Result<u16, PacketError> {
    let array = octets
        .get(pos..pos + 2)
        .ok_or(PacketError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(array))
}

fn read_u32(octets: &[u8], pos: usize) -> Result<u32, PacketError> {
    let array = octets
        .get(pos..pos + 4)
        .ok_or(PacketError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(array))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`TransferPacket`] could not be decoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PacketError {
    /// The input ended before the packet did. On a stream this means
    /// "wait for more bytes", not "give up".
    Truncated,
    BadUtf8,
    BadSyntax,
    BadStage(u8),
    BadStatus(u8),
    BadName(NameError),
    BadInteger,
    UnknownType,
    BadRecord(RecordError),
    TrailingData,
}

impl From<MessageError> for PacketError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::Truncated => Self::Truncated,
            MessageError::BadUtf8 => Self::BadUtf8,
            MessageError::UnknownType => Self::UnknownType,
            MessageError::BadRecord(e) => Self::BadRecord(e),
            MessageError::InvalidName(e) => Self::BadName(e),
            _ => Self::BadSyntax,
        }
    }
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Truncated => f.write_str("unexpected end of packet"),
            Self::BadUtf8 => f.write_str("string field is not valid UTF-8"),
            Self::BadSyntax => f.write_str("malformed packet"),
            Self::BadStage(s) => write!(f, "invalid stage {s}"),
            Self::BadStatus(s) => write!(f, "invalid status {s}"),
            Self::BadName(err) => write!(f, "invalid zone name: {err}"),
            Self::BadInteger => f.write_str("malformed integer field"),
            Self::UnknownType => f.write_str("unknown record type"),
            Self::BadRecord(err) => write!(f, "invalid record: {err}"),
            Self::TrailingData => f.write_str("unexpected data after end of packet"),
        }
    }
}

impl std::error::Error for PacketError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
