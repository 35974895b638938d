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

//! The zone-transfer protocol.
//!
//! A zone transfer replicates one zone's records from a primary to a
//! secondary over a reliable stream. The secondary drives the
//! six-stage exchange implemented by [`secondary::transfer_cycle`];
//! the primary answers it through the [`primary::Session`] state
//! machine. Both sides speak [`packet::TransferPacket`] frames through
//! the [`Framed`] stream wrapper, so the state machines work over any
//! `Read + Write` stream and tests never need sockets.

use std::fmt;
use std::io::{self, Read, Write};

use crate::codec::WireMode;
use crate::db::CatalogError;

pub mod packet;
pub mod primary;
pub mod secondary;

use packet::{PacketError, TransferPacket, TransferStatus};

////////////////////////////////////////////////////////////////////////
// STREAM FRAMING                                                     //
////////////////////////////////////////////////////////////////////////

/// How many bytes to read from the stream at a time.
const READ_CHUNK: usize = 1024;

/// A packet-framed wrapper around a byte stream.
///
/// The wrapper accumulates incoming bytes and yields exactly one
/// [`TransferPacket`] per completed frame, never a partial frame and
/// never two at once. Frame boundaries come from the wire mode:
/// newline-delimited in text mode, length-implied in binary mode.
pub struct Framed<S> {
    stream: S,
    mode: WireMode,
    buffer: Vec<u8>,
}

impl<S: Read + Write> Framed<S> {
    pub fn new(stream: S, mode: WireMode) -> Self {
        Self {
            stream,
            mode,
            buffer: Vec::new(),
        }
    }

    /// Sends one packet as one frame.
    pub fn send(&mut self, packet: &TransferPacket) -> io::Result<()> {
        let frame = self.mode.encode_packet(packet);
        self.stream.write_all(&frame)
    }

    /// Receives the next packet. Returns `None` on a clean end of
    /// stream (no buffered bytes); an end of stream in the middle of a
    /// frame is a [`TransferError::ConnectionClosed`].
    pub fn recv(&mut self) -> Result<Option<TransferPacket>, TransferError> {
        loop {
            if let Some(len) = self.mode.split_frame(&self.buffer)? {
                let frame: Vec<u8> = self.buffer.drain(..len).collect();
                return Ok(Some(self.mode.decode_packet(&frame)?));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransferError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// OUTCOMES AND ERRORS                                                //
////////////////////////////////////////////////////////////////////////

/// The result of one successful transfer cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The primary's serial matched ours; nothing was transferred.
    Unchanged,
    /// A new record set of this many records was installed.
    Installed(usize),
}

/// An error that abandons the current transfer cycle.
#[derive(Debug)]
pub enum TransferError {
    Io(io::Error),
    Packet(PacketError),
    /// The primary answered with an error status at some stage.
    Status { stage: u8, status: TransferStatus },
    /// The peer sent a packet that does not belong at this point of
    /// the exchange.
    UnexpectedPacket { stage: u8 },
    /// A stage-5 record arrived out of order.
    OrdinalGap { expected: u16, got: u16 },
    /// The stream ended in the middle of the exchange.
    ConnectionClosed,
    Install(CatalogError),
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<PacketError> for TransferError {
    fn from(err: PacketError) -> Self {
        Self::Packet(err)
    }
}

impl From<CatalogError> for TransferError {
    fn from(err: CatalogError) -> Self {
        Self::Install(err)
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Packet(err) => write!(f, "bad packet: {err}"),
            Self::Status { stage, status } => {
                write!(f, "primary answered stage {stage} with status \"{status}\"")
            }
            Self::UnexpectedPacket { stage } => {
                write!(f, "unexpected stage-{stage} packet")
            }
            Self::OrdinalGap { expected, got } => {
                write!(f, "expected record {expected}, got record {got}")
            }
            Self::ConnectionClosed => f.write_str("connection closed mid-transfer"),
            Self::Install(err) => write!(f, "failed to install records: {err}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Packet(err) => Some(err),
            Self::Install(err) => Some(err),
            _ => None,
        }
    }
}
