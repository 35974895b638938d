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

//! Zones: the unit of authority.
//!
//! A [`PrimaryZone`] owns the file-backed copy of its records, fixed
//! at load time. A [`SecondaryZone`] owns a replicated copy that the
//! zone-transfer client replaces wholesale after each successful
//! transfer; its record set lives behind an `RwLock` so installs are
//! atomic with respect to concurrent query answering. [`Zone`] is the
//! tagged union over the two.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::RwLock;
use std::time::Duration;

use super::CatalogError;
use crate::message::{QueryInfo, QueryResponse};
use crate::name::Name;
use crate::rr::{Record, RecordType};

/// The refresh and retry interval a secondary assumes before its
/// first successful transfer supplies the zone's SOA values.
pub const DEFAULT_SOA_INTERVAL: Duration = Duration::from_secs(60);

////////////////////////////////////////////////////////////////////////
// PRIMARY ZONES                                                      //
////////////////////////////////////////////////////////////////////////

/// A zone whose authoritative data this node owns.
#[derive(Debug)]
pub struct PrimaryZone {
    name: Name,
    serial: u32,
    records: Vec<Record>,
    aliases: HashMap<Name, Name>,
    authorized: Vec<IpAddr>,
}

impl PrimaryZone {
    /// Creates a primary zone from its loaded records. The records
    /// must include an `SOASERIAL` at the zone apex; `authorized`
    /// lists the secondaries allowed to transfer the zone.
    pub fn new(
        name: Name,
        records: Vec<Record>,
        authorized: Vec<IpAddr>,
    ) -> Result<Self, CatalogError> {
        let serial = find_serial(&name, &records).ok_or(CatalogError::MissingSerial(name.clone()))?;
        let aliases = collect_aliases(&records);
        Ok(Self {
            name,
            serial,
            records,
            aliases,
            authorized,
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns whether `peer` is an authorized secondary for this
    /// zone.
    pub fn is_authorized(&self, peer: IpAddr) -> bool {
        self.authorized.contains(&peer)
    }

    /// Answers a query from the zone's records, authoritatively. The
    /// answer is final unless the zone merely delegates the queried
    /// name to a deeper server.
    pub fn answer_query(&self, query: &QueryInfo) -> QueryResponse {
        let query = resolve_alias(query, &self.aliases);
        answer_from(&self.name, &query, &self.records)
    }
}

////////////////////////////////////////////////////////////////////////
// SECONDARY ZONES                                                    //
////////////////////////////////////////////////////////////////////////

/// A zone whose data this node replicates from a primary.
#[derive(Debug)]
pub struct SecondaryZone {
    name: Name,
    primary: SocketAddr,
    data: RwLock<SecondaryData>,
}

#[derive(Debug)]
struct SecondaryData {
    records: Vec<Record>,
    serial: Option<u32>,
    refresh: Duration,
    retry: Duration,
    aliases: HashMap<Name, Name>,
}

impl SecondaryZone {
    /// Creates an empty secondary zone that will replicate from
    /// `primary`.
    pub fn new(name: Name, primary: SocketAddr) -> Self {
        Self {
            name,
            primary,
            data: RwLock::new(SecondaryData {
                records: Vec::new(),
                serial: None,
                refresh: DEFAULT_SOA_INTERVAL,
                retry: DEFAULT_SOA_INTERVAL,
                aliases: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the address of the primary this zone replicates from.
    pub fn primary(&self) -> SocketAddr {
        self.primary
    }

    /// Returns the serial of the currently installed record set, if a
    /// transfer has completed yet.
    pub fn serial(&self) -> Option<u32> {
        self.data.read().unwrap().serial
    }

    pub fn refresh_interval(&self) -> Duration {
        self.data.read().unwrap().refresh
    }

    pub fn retry_interval(&self) -> Duration {
        self.data.read().unwrap().retry
    }

    /// Atomically replaces the zone's records with a freshly
    /// transferred set, deriving the serial and the SOA intervals from
    /// the new records. Readers see either the old set or the new one.
    pub fn install(&self, records: Vec<Record>) {
        let serial = find_serial(&self.name, &records);
        let aliases = collect_aliases(&records);
        let interval = |rtype| {
            find_apex_u32(&self.name, &records, rtype)
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(DEFAULT_SOA_INTERVAL)
        };
        let new = SecondaryData {
            serial,
            refresh: interval(RecordType::SoaRefresh),
            retry: interval(RecordType::SoaRetry),
            aliases,
            records,
        };
        *self.data.write().unwrap() = new;
    }

    /// Answers a query from the replicated records, authoritatively.
    /// The answer is final unless the zone merely delegates the
    /// queried name to a deeper server.
    pub fn answer_query(&self, query: &QueryInfo) -> QueryResponse {
        let data = self.data.read().unwrap();
        let query = resolve_alias(query, &data.aliases);
        answer_from(&self.name, &query, &data.records)
    }
}

////////////////////////////////////////////////////////////////////////
// THE ZONE UNION                                                     //
////////////////////////////////////////////////////////////////////////

/// A zone this node is authoritative for, in either role.
#[derive(Debug)]
pub enum Zone {
    Primary(PrimaryZone),
    Secondary(SecondaryZone),
}

impl Zone {
    pub fn name(&self) -> &Name {
        match self {
            Self::Primary(zone) => zone.name(),
            Self::Secondary(zone) => zone.name(),
        }
    }

    pub fn serial(&self) -> Option<u32> {
        match self {
            Self::Primary(zone) => Some(zone.serial()),
            Self::Secondary(zone) => zone.serial(),
        }
    }

    pub fn answer_query(&self, query: &QueryInfo) -> QueryResponse {
        match self {
            Self::Primary(zone) => zone.answer_query(query),
            Self::Secondary(zone) => zone.answer_query(query),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SHARED HELPERS                                                     //
////////////////////////////////////////////////////////////////////////

/// Builds a zone's answer to a query. The answer is authoritative,
/// and final unless it is empty and the zone's records delegate the
/// queried name below the apex. In that case it is a referral for the
/// resolver (ours or a remote one) to chase.
fn answer_from(apex: &Name, query: &QueryInfo, records: &[Record]) -> QueryResponse {
    let has_value = records
        .iter()
        .any(|r| r.rtype() == query.rtype && r.owner() == &query.name);
    let delegated = !has_value
        && records.iter().any(|r| {
            r.rtype() == RecordType::Ns
                && query.name.is_subdomain_of(r.owner())
                && r.owner().label_count() > apex.label_count()
        });
    QueryResponse::from_records(query, records, !delegated, true)
}

fn find_apex_u32(name: &Name, records: &[Record], rtype: RecordType) -> Option<u32> {
    records
        .iter()
        .find(|r| r.rtype() == rtype && r.owner() == name)
        .and_then(Record::value_as_u32)
}

fn find_serial(name: &Name, records: &[Record]) -> Option<u32> {
    find_apex_u32(name, records, RecordType::SoaSerial)
}

fn collect_aliases(records: &[Record]) -> HashMap<Name, Name> {
    records
        .iter()
        .filter(|r| r.rtype() == RecordType::Cname)
        .filter_map(|r| Some((r.owner().clone(), r.value_as_name()?)))
        .collect()
}

/// Rewrites the queried name through the zone's aliases (one exact
/// match, one pass) before record matching.
fn resolve_alias(query: &QueryInfo, aliases: &HashMap<Name, Name>) -> QueryInfo {
    match aliases.get(&query.name) {
        Some(target) => QueryInfo::new(target.clone(), query.rtype),
        None => query.clone(),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Record {
        text.parse().unwrap()
    }

    fn zone_records() -> Vec<Record> {
        vec![
            record("example.com. SOASP ns1.example.com. 86400"),
            record("example.com. SOASERIAL 2022112001 86400"),
            record("example.com. SOAREFRESH 120 86400"),
            record("example.com. SOARETRY 30 86400"),
            record("example.com. SOAEXPIRE 3600 86400"),
            record("example.com. NS ns1.example.com. 86400"),
            record("ns1.example.com. A 192.0.2.53 86400"),
            record("www.example.com. A 192.0.2.1 300"),
            record("web.example.com. CNAME www.example.com. 300"),
        ]
    }

    fn query(name: &str, rtype: RecordType) -> QueryInfo {
        QueryInfo::new(name.parse().unwrap(), rtype)
    }

    #[test]
    fn primary_zone_answers_authoritatively() {
        let zone = PrimaryZone::new(
            "example.com.".parse().unwrap(),
            zone_records(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(zone.serial(), 2022112001);

        let response = zone.answer_query(&query("www.example.com.", RecordType::A));
        assert!(response.is_final());
        assert!(response.is_authoritative());
        assert_eq!(response.values().len(), 1);
        assert_eq!(response.values()[0].value(), "192.0.2.1");
    }

    #[test]
    fn primary_zone_requires_a_serial() {
        let records = vec![record("example.com. NS ns1.example.com. 86400")];
        assert_eq!(
            PrimaryZone::new("example.com.".parse().unwrap(), records, Vec::new())
                .unwrap_err(),
            CatalogError::MissingSerial("example.com.".parse().unwrap()),
        );
    }

    #[test]
    fn aliases_rewrite_the_queried_name() {
        let zone = PrimaryZone::new(
            "example.com.".parse().unwrap(),
            zone_records(),
            Vec::new(),
        )
        .unwrap();
        let response = zone.answer_query(&query("web.example.com.", RecordType::A));
        assert_eq!(response.values().len(), 1);
        assert_eq!(response.values()[0].value(), "192.0.2.1");
    }

    #[test]
    fn delegated_names_get_a_referral_not_a_negative() {
        let zone = PrimaryZone::new(
            "com.".parse().unwrap(),
            vec![
                record("com. SOASERIAL 7 86400"),
                record("example.com. NS ns1.example.com. 86400"),
                record("ns1.example.com. A 192.0.2.53 86400"),
            ],
            Vec::new(),
        )
        .unwrap();

        // A name under a delegated subdomain yields a non-final
        // referral carrying the delegation and its glue.
        let referral = zone.answer_query(&query("www.example.com.", RecordType::A));
        assert!(!referral.is_final());
        assert!(referral.is_authoritative());
        assert_eq!(referral.authorities().len(), 1);
        assert_eq!(referral.extra_values().len(), 1);

        // A name with no delegation below the apex yields a final
        // authoritative negative.
        let negative = zone.answer_query(&query("www.other.com.", RecordType::A));
        assert!(negative.is_final());
        assert!(negative.values().is_empty());
    }

    #[test]
    fn authorization_is_by_listed_address() {
        let zone = PrimaryZone::new(
            "example.com.".parse().unwrap(),
            zone_records(),
            vec!["192.0.2.7".parse().unwrap()],
        )
        .unwrap();
        assert!(zone.is_authorized("192.0.2.7".parse().unwrap()));
        assert!(!zone.is_authorized("192.0.2.8".parse().unwrap()));
    }

    #[test]
    fn secondary_install_replaces_everything() {
        let zone = SecondaryZone::new(
            "example.com.".parse().unwrap(),
            "192.0.2.1:5300".parse().unwrap(),
        );
        assert_eq!(zone.serial(), None);
        assert_eq!(zone.refresh_interval(), DEFAULT_SOA_INTERVAL);
        assert!(zone
            .answer_query(&query("www.example.com.", RecordType::A))
            .values()
            .is_empty());

        zone.install(zone_records());
        assert_eq!(zone.serial(), Some(2022112001));
        assert_eq!(zone.refresh_interval(), Duration::from_secs(120));
        assert_eq!(zone.retry_interval(), Duration::from_secs(30));

        let response = zone.answer_query(&query("www.example.com.", RecordType::A));
        assert!(response.is_final());
        assert!(response.is_authoritative());
        assert_eq!(response.values().len(), 1);
    }
}
