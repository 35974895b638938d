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

//! The authority database.
//!
//! This module provides the node's view of the zone data it is
//! authoritative for: the [`Authority`] trait consumed by the
//! resolution engine and the zone-transfer state machines, and the
//! [`ZoneCatalog`] implementation over [`Zone`]s (primary or
//! secondary), default delegations, and the top-server list.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::message::{QueryInfo, QueryResponse};
use crate::name::Name;
use crate::rr::Record;

mod catalog;
mod zone;

pub use catalog::{ZoneCatalog, FIRST_HOP_TTL};
pub use zone::{PrimaryZone, SecondaryZone, Zone, DEFAULT_SOA_INTERVAL};

////////////////////////////////////////////////////////////////////////
// THE AUTHORITY TRAIT                                                //
////////////////////////////////////////////////////////////////////////

/// Trait for authority data sources.
///
/// The resolution engine and the zone-transfer state machines consume
/// zone data exclusively through this interface, so tests can
/// substitute scripted implementations and the engine never depends on
/// how zones are stored.
///
/// Implementations must be safe for concurrent readers; the only
/// mutation, [`Authority::install_zone_entries`], must replace a
/// zone's record set atomically so that concurrent readers observe
/// either the old set or the new one, never a mix.
pub trait Authority {
    /// Answers a query from the stored zones. The deepest zone whose
    /// apex is an ancestor of the queried name answers authoritatively
    /// (and finally); if no zone matches, the response is empty and
    /// non-final.
    fn answer_query(&self, query: &QueryInfo) -> QueryResponse;

    /// Returns whether this node may answer queries about `name` at
    /// all. A node with no default delegations answers everything;
    /// otherwise the name must fall under one of them.
    fn answers(&self, name: &Name) -> bool;

    /// Returns the referral a resolution should start from: the
    /// nearest configured default delegation for `name`, or the
    /// top-server list.
    fn first_hop_servers(&self, name: &Name) -> QueryResponse;

    /// Returns whether `peer` may transfer `zone` from this node.
    fn is_authorized_secondary(&self, zone: &Name, peer: IpAddr) -> bool;

    /// Returns the serial of the named zone, if the zone exists and
    /// has one. A secondary zone has no serial before its first
    /// successful transfer.
    fn zone_serial(&self, zone: &Name) -> Option<u32>;

    /// Returns the records a zone transfer of `zone` would serve.
    /// Only primary zones serve transfers.
    fn zone_entries(&self, zone: &Name) -> Option<Vec<Record>>;

    /// Atomically replaces the record set of the named secondary zone.
    fn install_zone_entries(&self, zone: &Name, records: Vec<Record>) -> Result<(), CatalogError>;

    /// Returns the refresh interval of the named secondary zone.
    fn refresh_interval(&self, zone: &Name) -> Duration;

    /// Returns the retry interval of the named secondary zone.
    fn retry_interval(&self, zone: &Name) -> Duration;

    /// Lists the secondary zones and the primary each replicates from,
    /// for spawning one transfer-client loop per zone.
    fn secondary_zones(&self) -> Vec<(Name, SocketAddr)>;
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error from building or updating the zone catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CatalogError {
    UnknownZone(Name),
    NotSecondary(Name),
    DuplicateZone(Name),
    DuplicateDelegation(Name),
    MissingSerial(Name),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownZone(zone) => write!(f, "no such zone: {zone}"),
            Self::NotSecondary(zone) => write!(f, "zone {zone} is not a secondary zone"),
            Self::DuplicateZone(zone) => write!(f, "zone {zone} is declared twice"),
            Self::DuplicateDelegation(name) => {
                write!(f, "default delegation for {name} is declared twice")
            }
            Self::MissingSerial(zone) => {
                write!(f, "zone {zone} has no SOASERIAL record at its apex")
            }
        }
    }
}

impl std::error::Error for CatalogError {}
