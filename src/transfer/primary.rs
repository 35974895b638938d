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

//! The primary's side of a zone transfer.
//!
//! A [`Session`] serves one inbound connection. The zone named by the
//! first stage-0 request binds to the connection and every later stage
//! must name the same zone. Authorization of the peer's source address
//! is re-checked on every stage; failures are answered with an error
//! status, never by closing the connection; the secondary decides
//! whether to retry or give up.

use std::io::{Read, Write};
use std::net::IpAddr;

use log::{debug, warn};

use super::packet::{TransferPacket, TransferStatus};
use super::{Framed, TransferError};
use crate::codec::WireMode;
use crate::db::Authority;
use crate::name::Name;

////////////////////////////////////////////////////////////////////////
// THE RESPONDER STATE MACHINE                                        //
////////////////////////////////////////////////////////////////////////

/// The primary-side state machine for one transfer connection.
pub struct Session<'a, A> {
    authority: &'a A,
    peer: IpAddr,
    zone: Option<Name>,
}

impl<'a, A: Authority> Session<'a, A> {
    pub fn new(authority: &'a A, peer: IpAddr) -> Self {
        Self {
            authority,
            peer,
            zone: None,
        }
    }

    /// Handles one request packet, producing the reply packets to send
    /// (several for an accepted stage 4: one per record).
    pub fn handle(&mut self, packet: &TransferPacket) -> Vec<TransferPacket> {
        match packet {
            TransferPacket::SerialQuery { zone } => {
                if self.zone.is_none() {
                    self.zone = Some(zone.clone());
                }
                let status = self.request_status(zone);
                let serial = if status == TransferStatus::Success {
                    self.authority.zone_serial(zone).unwrap_or(0)
                } else {
                    0
                };
                vec![TransferPacket::Serial { status, serial }]
            }

            TransferPacket::CountQuery { zone } => {
                let status = self.request_status(zone);
                let count = if status == TransferStatus::Success {
                    self.record_count(zone)
                } else {
                    None
                };
                match count {
                    Some(count) => vec![TransferPacket::Count { status, count }],
                    None => vec![TransferPacket::Count {
                        status: error_or(status, TransferStatus::BadRequest),
                        count: 0,
                    }],
                }
            }

            TransferPacket::CountAck { zone, count } => {
                let status = self.request_status(zone);
                if status != TransferStatus::Success {
                    return vec![TransferPacket::EntryDenied { status }];
                }
                let records = self.authority.zone_entries(zone).unwrap_or_default();
                if Some(*count) != self.record_count(zone) {
                    debug!(
                        "transfer peer {} acknowledged {count} records for {zone}, \
                         which is not the zone's count",
                        self.peer,
                    );
                    return vec![TransferPacket::EntryDenied {
                        status: TransferStatus::BadRequest,
                    }];
                }
                records
                    .into_iter()
                    .enumerate()
                    .map(|(i, record)| TransferPacket::EntryData {
                        ordinal: i as u16,
                        record,
                    })
                    .collect()
            }

            // Reply packets have no business arriving at the primary.
            TransferPacket::Serial { .. }
            | TransferPacket::Count { .. }
            | TransferPacket::EntryData { .. }
            | TransferPacket::EntryDenied { .. } => {
                debug!(
                    "transfer peer {} sent a stage-{} packet where a request was expected",
                    self.peer,
                    packet.stage(),
                );
                vec![TransferPacket::Serial {
                    status: TransferStatus::BadRequest,
                    serial: 0,
                }]
            }
        }
    }

    /// Computes the status of a request naming `zone`: the name must
    /// match the bound zone, the zone must be one this node serves
    /// transfers for, and the peer must be authorized. The checks run
    /// again on every stage.
    fn request_status(&self, zone: &Name) -> TransferStatus {
        match &self.zone {
            Some(bound) if bound != zone => return TransferStatus::BadRequest,
            None => return TransferStatus::NoSuchZone,
            Some(_) => (),
        }
        if self.authority.zone_entries(zone).is_none() {
            TransferStatus::NoSuchZone
        } else if !self.authority.is_authorized_secondary(zone, self.peer) {
            TransferStatus::Unauthorized
        } else {
            TransferStatus::Success
        }
    }

    /// The zone's record count, if it fits the wire field.
    fn record_count(&self, zone: &Name) -> Option<u16> {
        let records = self.authority.zone_entries(zone)?;
        records.len().try_into().ok()
    }
}

/// Returns `status` unless it is success, in which case `fallback`.
fn error_or(status: TransferStatus, fallback: TransferStatus) -> TransferStatus {
    if status == TransferStatus::Success {
        fallback
    } else {
        status
    }
}

////////////////////////////////////////////////////////////////////////
// CONNECTION SERVING                                                 //
////////////////////////////////////////////////////////////////////////

/// Serves one inbound transfer connection until the peer closes it.
pub fn serve<S, A>(
    stream: S,
    authority: &A,
    peer: IpAddr,
    mode: WireMode,
) -> Result<(), TransferError>
where
    S: Read + Write,
    A: Authority,
{
    let mut framed = Framed::new(stream, mode);
    let mut session = Session::new(authority, peer);

    loop {
        let packet = match framed.recv() {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(()),
            Err(TransferError::Packet(e)) => {
                warn!("bad transfer frame from {peer}: {e}");
                framed.send(&TransferPacket::Serial {
                    status: TransferStatus::BadRequest,
                    serial: 0,
                })?;
                match mode {
                    // A text frame is still newline-delimited, so the
                    // stream can resynchronize on the next line. A bad
                    // binary frame leaves no way to find the next
                    // boundary.
                    WireMode::Text => continue,
                    WireMode::Binary => return Ok(()),
                }
            }
            Err(e) => return Err(e),
        };

        for reply in session.handle(&packet) {
            framed.send(&reply)?;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PrimaryZone, Zone, ZoneCatalog};
    use crate::rr::Record;

    const AUTHORIZED: &str = "192.0.2.7";
    const STRANGER: &str = "192.0.2.66";

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn zone_records() -> Vec<Record> {
        vec![
            "example.com. SOASERIAL 11 86400".parse().unwrap(),
            "example.com. NS ns1.example.com. 86400".parse().unwrap(),
            "ns1.example.com. A 192.0.2.53 86400".parse().unwrap(),
        ]
    }

    fn catalog() -> ZoneCatalog {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog
            .add_zone(Zone::Primary(
                PrimaryZone::new(
                    name("example.com."),
                    zone_records(),
                    vec![AUTHORIZED.parse().unwrap()],
                )
                .unwrap(),
            ))
            .unwrap();
        catalog
    }

    #[test]
    fn an_authorized_secondary_gets_the_whole_zone() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());

        let replies = session.handle(&TransferPacket::SerialQuery {
            zone: name("example.com."),
        });
        assert_eq!(
            replies,
            vec![TransferPacket::Serial {
                status: TransferStatus::Success,
                serial: 11,
            }],
        );

        let replies = session.handle(&TransferPacket::CountQuery {
            zone: name("example.com."),
        });
        assert_eq!(
            replies,
            vec![TransferPacket::Count {
                status: TransferStatus::Success,
                count: 3,
            }],
        );

        let replies = session.handle(&TransferPacket::CountAck {
            zone: name("example.com."),
            count: 3,
        });
        assert_eq!(replies.len(), 3);
        for (i, reply) in replies.iter().enumerate() {
            match reply {
                TransferPacket::EntryData { ordinal, record } => {
                    assert_eq!(*ordinal, i as u16);
                    assert_eq!(*record, zone_records()[i]);
                }
                other => panic!("expected EntryData, got {other:?}"),
            }
        }
    }

    #[test]
    fn a_stranger_is_refused_at_every_stage() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, STRANGER.parse().unwrap());

        let zone = name("example.com.");
        assert_eq!(
            session.handle(&TransferPacket::SerialQuery { zone: zone.clone() }),
            vec![TransferPacket::Serial {
                status: TransferStatus::Unauthorized,
                serial: 0,
            }],
        );
        assert_eq!(
            session.handle(&TransferPacket::CountQuery { zone: zone.clone() }),
            vec![TransferPacket::Count {
                status: TransferStatus::Unauthorized,
                count: 0,
            }],
        );
        assert_eq!(
            session.handle(&TransferPacket::CountAck { zone, count: 3 }),
            vec![TransferPacket::EntryDenied {
                status: TransferStatus::Unauthorized,
            }],
        );
    }

    #[test]
    fn an_unknown_zone_is_reported() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        assert_eq!(
            session.handle(&TransferPacket::SerialQuery {
                zone: name("missing.org."),
            }),
            vec![TransferPacket::Serial {
                status: TransferStatus::NoSuchZone,
                serial: 0,
            }],
        );
    }

    #[test]
    fn secondary_zones_do_not_serve_transfers() {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog
            .add_zone(Zone::Secondary(crate::db::SecondaryZone::new(
                name("replica.org."),
                "192.0.2.1:5300".parse().unwrap(),
            )))
            .unwrap();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        assert_eq!(
            session.handle(&TransferPacket::SerialQuery {
                zone: name("replica.org."),
            }),
            vec![TransferPacket::Serial {
                status: TransferStatus::NoSuchZone,
                serial: 0,
            }],
        );
    }

    #[test]
    fn later_stages_must_name_the_bound_zone() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        session.handle(&TransferPacket::SerialQuery {
            zone: name("example.com."),
        });
        assert_eq!(
            session.handle(&TransferPacket::CountQuery {
                zone: name("other.org."),
            }),
            vec![TransferPacket::Count {
                status: TransferStatus::BadRequest,
                count: 0,
            }],
        );
    }

    #[test]
    fn a_count_query_without_a_bound_zone_is_refused() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        assert_eq!(
            session.handle(&TransferPacket::CountQuery {
                zone: name("example.com."),
            }),
            vec![TransferPacket::Count {
                status: TransferStatus::NoSuchZone,
                count: 0,
            }],
        );
    }

    #[test]
    fn a_wrong_acknowledged_count_is_refused() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        session.handle(&TransferPacket::SerialQuery {
            zone: name("example.com."),
        });
        assert_eq!(
            session.handle(&TransferPacket::CountAck {
                zone: name("example.com."),
                count: 2,
            }),
            vec![TransferPacket::EntryDenied {
                status: TransferStatus::BadRequest,
            }],
        );
    }

    #[test]
    fn reply_packets_are_answered_with_bad_request() {
        let catalog = catalog();
        let mut session = Session::new(&catalog, AUTHORIZED.parse().unwrap());
        assert_eq!(
            session.handle(&TransferPacket::Serial {
                status: TransferStatus::Success,
                serial: 1,
            }),
            vec![TransferPacket::Serial {
                status: TransferStatus::BadRequest,
                serial: 0,
            }],
        );
    }
}
