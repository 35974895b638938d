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

//! The secondary's side of a zone transfer.
//!
//! [`transfer_cycle`] runs one complete exchange over an established
//! stream: probe the primary's serial, and if it differs from the
//! local one, pull the whole record set and install it atomically.
//! [`run`] is the forever loop the I/O layer spawns per secondary
//! zone: cycle, then sleep for the zone's refresh interval on success
//! or its retry interval on failure.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::packet::{TransferPacket, TransferStatus};
use super::{Framed, Outcome, TransferError};
use crate::codec::WireMode;
use crate::db::Authority;
use crate::name::Name;
use crate::thread::ThreadGroup;

/// How long to wait for a connection to the primary.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for any single read from the primary.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

////////////////////////////////////////////////////////////////////////
// ONE TRANSFER CYCLE                                                 //
////////////////////////////////////////////////////////////////////////

/// Runs one transfer cycle for `zone` over `stream`.
///
/// Any error abandons the cycle without installing anything: a partial
/// record set is never visible. Records are installed, in one atomic
/// replace, only after exactly the announced number of stage-5 frames
/// has arrived in order.
pub fn transfer_cycle<S, A>(
    stream: S,
    authority: &A,
    zone: &Name,
    mode: WireMode,
) -> Result<Outcome, TransferError>
where
    S: Read + Write,
    A: Authority,
{
    let mut framed = Framed::new(stream, mode);

    framed.send(&TransferPacket::SerialQuery { zone: zone.clone() })?;
    let serial = match recv(&mut framed)? {
        TransferPacket::Serial {
            status: TransferStatus::Success,
            serial,
        } => serial,
        TransferPacket::Serial { status, .. } => {
            return Err(TransferError::Status { stage: 1, status });
        }
        other => {
            return Err(TransferError::UnexpectedPacket {
                stage: other.stage(),
            });
        }
    };

    if authority.zone_serial(zone) == Some(serial) {
        return Ok(Outcome::Unchanged);
    }

    framed.send(&TransferPacket::CountQuery { zone: zone.clone() })?;
    let count = match recv(&mut framed)? {
        TransferPacket::Count {
            status: TransferStatus::Success,
            count,
        } => count,
        TransferPacket::Count { status, .. } => {
            return Err(TransferError::Status { stage: 3, status });
        }
        other => {
            return Err(TransferError::UnexpectedPacket {
                stage: other.stage(),
            });
        }
    };

    framed.send(&TransferPacket::CountAck {
        zone: zone.clone(),
        count,
    })?;

    let mut records = Vec::with_capacity(count as usize);
    for expected in 0..count {
        match recv(&mut framed)? {
            TransferPacket::EntryData { ordinal, record } => {
                if ordinal != expected {
                    return Err(TransferError::OrdinalGap {
                        expected,
                        got: ordinal,
                    });
                }
                records.push(record);
            }
            TransferPacket::EntryDenied { status } => {
                return Err(TransferError::Status { stage: 5, status });
            }
            other => {
                return Err(TransferError::UnexpectedPacket {
                    stage: other.stage(),
                });
            }
        }
    }

    authority.install_zone_entries(zone, records)?;
    Ok(Outcome::Installed(count as usize))
}

fn recv<S: Read + Write>(framed: &mut Framed<S>) -> Result<TransferPacket, TransferError> {
    framed.recv()?.ok_or(TransferError::ConnectionClosed)
}

////////////////////////////////////////////////////////////////////////
// THE PER-ZONE CLIENT LOOP                                           //
////////////////////////////////////////////////////////////////////////

/// The forever loop replicating one secondary zone, run on its own
/// thread. Sleeps for the zone's refresh interval after a successful
/// cycle and its retry interval after a failed one; wakes early when
/// the thread group shuts down.
pub fn run<A: Authority>(
    authority: &A,
    zone: &Name,
    primary: SocketAddr,
    mode: WireMode,
    group: &Arc<ThreadGroup>,
) {
    loop {
        if group.is_shutting_down() {
            return;
        }

        let delay = match run_once(authority, zone, primary, mode) {
            Ok(Outcome::Unchanged) => {
                debug!("zone {zone}: serial unchanged at {primary}");
                authority.refresh_interval(zone)
            }
            Ok(Outcome::Installed(count)) => {
                info!("zone {zone}: installed {count} records from {primary}");
                authority.refresh_interval(zone)
            }
            Err(e) => {
                warn!("zone {zone}: transfer from {primary} failed: {e}");
                authority.retry_interval(zone)
            }
        };

        if group.wait_for_shutdown(delay) {
            return;
        }
    }
}

fn run_once<A: Authority>(
    authority: &A,
    zone: &Name,
    primary: SocketAddr,
    mode: WireMode,
) -> Result<Outcome, TransferError> {
    let stream = TcpStream::connect_timeout(&primary, CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    transfer_cycle(stream, authority, zone, mode)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::db::{SecondaryZone, Zone, ZoneCatalog};
    use crate::rr::Record;

    /// A fake stream: reads from a script, collects writes.
    struct Pipe {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Pipe {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const MODE: WireMode = WireMode::Binary;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn zone_records() -> Vec<Record> {
        vec![
            "replica.org. SOASERIAL 12 86400".parse().unwrap(),
            "replica.org. SOAREFRESH 120 86400".parse().unwrap(),
            "www.replica.org. A 192.0.2.1 300".parse().unwrap(),
        ]
    }

    fn catalog_with_replica() -> ZoneCatalog {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog
            .add_zone(Zone::Secondary(SecondaryZone::new(
                name("replica.org."),
                "192.0.2.1:5300".parse().unwrap(),
            )))
            .unwrap();
        catalog
    }

    fn frames(packets: &[TransferPacket]) -> Vec<u8> {
        packets
            .iter()
            .flat_map(|p| MODE.encode_packet(p))
            .collect()
    }

    /// Decodes the requests the secondary wrote to the stream.
    fn sent(pipe: &Pipe) -> Vec<TransferPacket> {
        let mut packets = Vec::new();
        let mut rest = pipe.output.as_slice();
        while !rest.is_empty() {
            let len = MODE.split_frame(rest).unwrap().unwrap();
            packets.push(MODE.decode_packet(&rest[..len]).unwrap());
            rest = &rest[len..];
        }
        packets
    }

    #[test]
    fn a_matching_serial_skips_the_transfer() {
        let catalog = catalog_with_replica();
        catalog
            .install_zone_entries(&name("replica.org."), zone_records())
            .unwrap();

        let mut pipe = Pipe::new(frames(&[TransferPacket::Serial {
            status: TransferStatus::Success,
            serial: 12,
        }]));
        let outcome = transfer_cycle(&mut pipe, &catalog, &name("replica.org."), MODE).unwrap();
        assert_eq!(outcome, Outcome::Unchanged);

        // Only the stage-0 probe went out; stage 2 was never issued.
        assert_eq!(
            sent(&pipe),
            vec![TransferPacket::SerialQuery {
                zone: name("replica.org."),
            }],
        );
    }

    #[test]
    fn a_differing_serial_pulls_and_installs_the_zone() {
        let catalog = catalog_with_replica();
        let records = zone_records();

        let mut reply_frames = vec![
            TransferPacket::Serial {
                status: TransferStatus::Success,
                serial: 12,
            },
            TransferPacket::Count {
                status: TransferStatus::Success,
                count: records.len() as u16,
            },
        ];
        for (i, record) in records.iter().enumerate() {
            reply_frames.push(TransferPacket::EntryData {
                ordinal: i as u16,
                record: record.clone(),
            });
        }

        let mut pipe = Pipe::new(frames(&reply_frames));
        let outcome = transfer_cycle(&mut pipe, &catalog, &name("replica.org."), MODE).unwrap();
        assert_eq!(outcome, Outcome::Installed(3));

        assert_eq!(
            sent(&pipe),
            vec![
                TransferPacket::SerialQuery {
                    zone: name("replica.org."),
                },
                TransferPacket::CountQuery {
                    zone: name("replica.org."),
                },
                TransferPacket::CountAck {
                    zone: name("replica.org."),
                    count: 3,
                },
            ],
        );

        // The install happened, with the serial and intervals derived
        // from the new records.
        assert_eq!(catalog.zone_serial(&name("replica.org.")), Some(12));
        assert_eq!(
            catalog.refresh_interval(&name("replica.org.")),
            Duration::from_secs(120),
        );
    }

    #[test]
    fn an_error_status_abandons_the_cycle() {
        let catalog = catalog_with_replica();
        let mut pipe = Pipe::new(frames(&[TransferPacket::Serial {
            status: TransferStatus::Unauthorized,
            serial: 0,
        }]));
        let err = transfer_cycle(&mut pipe, &catalog, &name("replica.org."), MODE).unwrap_err();
        match err {
            TransferError::Status { stage: 1, status } => {
                assert_eq!(status, TransferStatus::Unauthorized);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(catalog.zone_serial(&name("replica.org.")), None);
    }

    #[test]
    fn an_ordinal_gap_discards_the_partial_set() {
        let catalog = catalog_with_replica();
        let records = zone_records();

        let reply_frames = vec![
            TransferPacket::Serial {
                status: TransferStatus::Success,
                serial: 12,
            },
            TransferPacket::Count {
                status: TransferStatus::Success,
                count: 2,
            },
            TransferPacket::EntryData {
                ordinal: 0,
                record: records[0].clone(),
            },
            TransferPacket::EntryData {
                ordinal: 0,
                record: records[1].clone(),
            },
        ];
        let mut pipe = Pipe::new(frames(&reply_frames));
        let err = transfer_cycle(&mut pipe, &catalog, &name("replica.org."), MODE).unwrap_err();
        match err {
            TransferError::OrdinalGap { expected: 1, got: 0 } => (),
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was installed.
        assert_eq!(catalog.zone_serial(&name("replica.org.")), None);
    }

    #[test]
    fn a_dropped_connection_discards_the_partial_set() {
        let catalog = catalog_with_replica();
        let records = zone_records();

        let reply_frames = vec![
            TransferPacket::Serial {
                status: TransferStatus::Success,
                serial: 12,
            },
            TransferPacket::Count {
                status: TransferStatus::Success,
                count: 3,
            },
            TransferPacket::EntryData {
                ordinal: 0,
                record: records[0].clone(),
            },
        ];
        let mut pipe = Pipe::new(frames(&reply_frames));
        let err = transfer_cycle(&mut pipe, &catalog, &name("replica.org."), MODE).unwrap_err();
        match err {
            TransferError::ConnectionClosed => (),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(catalog.zone_serial(&name("replica.org.")), None);
    }

    #[test]
    fn both_sides_agree_end_to_end() {
        // Drive the primary state machine to produce the reply frames,
        // then run the secondary cycle against them.
        use crate::db::PrimaryZone;
        use crate::transfer::primary::Session;

        let mut primary_catalog = ZoneCatalog::new(Vec::new());
        let primary_records: Vec<Record> = vec![
            "replica.org. SOASERIAL 40 86400".parse().unwrap(),
            "www.replica.org. A 192.0.2.80 300".parse().unwrap(),
        ];
        primary_catalog
            .add_zone(Zone::Primary(
                PrimaryZone::new(
                    name("replica.org."),
                    primary_records.clone(),
                    vec!["192.0.2.9".parse().unwrap()],
                )
                .unwrap(),
            ))
            .unwrap();
        let mut session = Session::new(&primary_catalog, "192.0.2.9".parse().unwrap());

        let mut replies = Vec::new();
        for request in [
            TransferPacket::SerialQuery {
                zone: name("replica.org."),
            },
            TransferPacket::CountQuery {
                zone: name("replica.org."),
            },
            TransferPacket::CountAck {
                zone: name("replica.org."),
                count: 2,
            },
        ] {
            replies.extend(session.handle(&request));
        }

        let secondary_catalog = catalog_with_replica();
        let mut pipe = Pipe::new(frames(&replies));
        let outcome =
            transfer_cycle(&mut pipe, &secondary_catalog, &name("replica.org."), MODE).unwrap();
        assert_eq!(outcome, Outcome::Installed(2));
        assert_eq!(secondary_catalog.zone_serial(&name("replica.org.")), Some(40));
    }
}
