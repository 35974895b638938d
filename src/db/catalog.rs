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

//! The [`ZoneCatalog`]: the concrete [`Authority`] implementation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::{Authority, CatalogError, Zone, DEFAULT_SOA_INTERVAL};
use crate::message::{QueryInfo, QueryResponse};
use crate::name::Name;
use crate::rr::{Record, RecordType};

////////////////////////////////////////////////////////////////////////
// THE ZONE CATALOG                                                   //
////////////////////////////////////////////////////////////////////////

/// The TTL placed on the synthesized records of a first-hop referral.
pub const FIRST_HOP_TTL: u32 = 1_000_000_000;

/// The collection of zones a node is authoritative for, together with
/// its default delegations and the top-server list.
///
/// Queries are answered by the *deepest* zone whose apex is an
/// ancestor of the queried name; default delegations match the same
/// way. The catalog is immutable after startup except for secondary
/// zone installs, which the zones themselves make atomic.
#[derive(Debug, Default)]
pub struct ZoneCatalog {
    zones: Vec<Zone>,
    delegations: Vec<(Name, Ipv4Addr)>,
    top_servers: Vec<Ipv4Addr>,
}

impl ZoneCatalog {
    /// Creates a catalog with the given top-server list.
    pub fn new(top_servers: Vec<Ipv4Addr>) -> Self {
        Self {
            zones: Vec::new(),
            delegations: Vec::new(),
            top_servers,
        }
    }

    /// Adds a zone. Zone names must be unique.
    pub fn add_zone(&mut self, zone: Zone) -> Result<(), CatalogError> {
        if self.zones.iter().any(|z| z.name() == zone.name()) {
            return Err(CatalogError::DuplicateZone(zone.name().clone()));
        }
        self.zones.push(zone);
        Ok(())
    }

    /// Adds a default delegation: queries under `name` are referred to
    /// the server at `addr`.
    pub fn add_delegation(&mut self, name: Name, addr: Ipv4Addr) -> Result<(), CatalogError> {
        if self.delegations.iter().any(|(n, _)| *n == name) {
            return Err(CatalogError::DuplicateDelegation(name));
        }
        self.delegations.push((name, addr));
        Ok(())
    }

    /// Finds the deepest zone whose apex is an ancestor of `name`.
    fn deepest_zone_for(&self, name: &Name) -> Option<&Zone> {
        self.zones
            .iter()
            .filter(|z| name.is_subdomain_of(z.name()))
            .max_by_key(|z| z.name().label_count())
    }

    /// Finds a zone by its exact apex name.
    fn zone(&self, name: &Name) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name() == name)
    }

    /// Finds the deepest default delegation covering `name`.
    fn deepest_delegation_for(&self, name: &Name) -> Option<&(Name, Ipv4Addr)> {
        self.delegations
            .iter()
            .filter(|(n, _)| name.is_subdomain_of(n))
            .max_by_key(|(n, _)| n.label_count())
    }
}

impl Authority for ZoneCatalog {
    fn answer_query(&self, query: &QueryInfo) -> QueryResponse {
        match self.deepest_zone_for(&query.name) {
            Some(zone) => zone.answer_query(query),
            None => QueryResponse::empty(),
        }
    }

    fn answers(&self, name: &Name) -> bool {
        self.delegations.is_empty() || self.deepest_delegation_for(name).is_some()
    }

    fn first_hop_servers(&self, name: &Name) -> QueryResponse {
        if let Some((delegated, addr)) = self.deepest_delegation_for(name) {
            let ns_name: Name = if delegated.is_root() {
                "ns.".parse().unwrap()
            } else {
                format!("ns.{delegated}").parse().unwrap()
            };
            let authority = Record::new(
                delegated.clone(),
                RecordType::Ns,
                ns_name.as_str(),
                FIRST_HOP_TTL.into(),
                None,
            )
            .unwrap();
            let glue = Record::new(
                ns_name,
                RecordType::A,
                &addr.to_string(),
                FIRST_HOP_TTL.into(),
                None,
            )
            .unwrap();
            return QueryResponse::new(Vec::new(), vec![authority], vec![glue], false, false);
        }

        // No matching delegation: refer to the top servers, under the
        // synthesized names dns1., dns2., ...
        let mut authorities = Vec::new();
        let mut extra_values = Vec::new();
        for (i, addr) in self.top_servers.iter().enumerate() {
            let ns_name: Name = format!("dns{}.", i + 1).parse().unwrap();
            authorities.push(
                Record::new(
                    Name::root(),
                    RecordType::Ns,
                    ns_name.as_str(),
                    FIRST_HOP_TTL.into(),
                    None,
                )
                .unwrap(),
            );
            extra_values.push(
                Record::new(
                    ns_name,
                    RecordType::A,
                    &addr.to_string(),
                    FIRST_HOP_TTL.into(),
                    None,
                )
                .unwrap(),
            );
        }
        QueryResponse::new(Vec::new(), authorities, extra_values, false, false)
    }

    fn is_authorized_secondary(&self, zone: &Name, peer: IpAddr) -> bool {
        match self.zone(zone) {
            Some(Zone::Primary(primary)) => primary.is_authorized(peer),
            _ => false,
        }
    }

    fn zone_serial(&self, zone: &Name) -> Option<u32> {
        self.zone(zone)?.serial()
    }

    fn zone_entries(&self, zone: &Name) -> Option<Vec<Record>> {
        match self.zone(zone)? {
            Zone::Primary(primary) => Some(primary.records().to_vec()),
            Zone::Secondary(_) => None,
        }
    }

    fn install_zone_entries(&self, zone: &Name, records: Vec<Record>) -> Result<(), CatalogError> {
        match self.zone(zone) {
            Some(Zone::Secondary(secondary)) => {
                secondary.install(records);
                Ok(())
            }
            Some(Zone::Primary(_)) => Err(CatalogError::NotSecondary(zone.clone())),
            None => Err(CatalogError::UnknownZone(zone.clone())),
        }
    }

    fn refresh_interval(&self, zone: &Name) -> Duration {
        match self.zone(zone) {
            Some(Zone::Secondary(secondary)) => secondary.refresh_interval(),
            _ => DEFAULT_SOA_INTERVAL,
        }
    }

    fn retry_interval(&self, zone: &Name) -> Duration {
        match self.zone(zone) {
            Some(Zone::Secondary(secondary)) => secondary.retry_interval(),
            _ => DEFAULT_SOA_INTERVAL,
        }
    }

    fn secondary_zones(&self) -> Vec<(Name, SocketAddr)> {
        self.zones
            .iter()
            .filter_map(|zone| match zone {
                Zone::Secondary(secondary) => {
                    Some((secondary.name().clone(), secondary.primary()))
                }
                Zone::Primary(_) => None,
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PrimaryZone, SecondaryZone};

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn record(text: &str) -> Record {
        text.parse().unwrap()
    }

    fn primary(apex: &str, records: Vec<Record>) -> Zone {
        Zone::Primary(PrimaryZone::new(name(apex), records, Vec::new()).unwrap())
    }

    fn example_zone() -> Zone {
        primary(
            "example.com.",
            vec![
                record("example.com. SOASERIAL 3 86400"),
                record("www.example.com. A 192.0.2.1 300"),
            ],
        )
    }

    #[test]
    fn the_deepest_zone_answers() {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog
            .add_zone(primary(
                "com.",
                vec![
                    record("com. SOASERIAL 1 86400"),
                    record("www.example.com. A 192.0.2.99 300"),
                ],
            ))
            .unwrap();
        catalog.add_zone(example_zone()).unwrap();

        let query = QueryInfo::new(name("www.example.com."), RecordType::A);
        let response = catalog.answer_query(&query);
        assert_eq!(response.values()[0].value(), "192.0.2.1");
    }

    #[test]
    fn no_zone_means_an_empty_answer() {
        let catalog = ZoneCatalog::new(Vec::new());
        let query = QueryInfo::new(name("www.example.com."), RecordType::A);
        assert!(!catalog.answer_query(&query).is_final());
    }

    #[test]
    fn answering_policy_follows_delegations() {
        let mut catalog = ZoneCatalog::new(Vec::new());
        assert!(catalog.answers(&name("anything.org.")));

        catalog
            .add_delegation(name("example.com."), "192.0.2.10".parse().unwrap())
            .unwrap();
        assert!(catalog.answers(&name("www.example.com.")));
        assert!(!catalog.answers(&name("anything.org.")));
    }

    #[test]
    fn first_hop_prefers_the_nearest_delegation() {
        let mut catalog = ZoneCatalog::new(vec!["192.0.2.100".parse().unwrap()]);
        catalog
            .add_delegation(name("com."), "192.0.2.10".parse().unwrap())
            .unwrap();
        catalog
            .add_delegation(name("example.com."), "192.0.2.20".parse().unwrap())
            .unwrap();

        let referral = catalog.first_hop_servers(&name("www.example.com."));
        assert!(!referral.is_final());
        assert_eq!(referral.authorities().len(), 1);
        assert_eq!(referral.authorities()[0].owner(), &name("example.com."));
        assert_eq!(referral.extra_values()[0].value(), "192.0.2.20");
    }

    #[test]
    fn first_hop_falls_back_to_top_servers() {
        let catalog = ZoneCatalog::new(vec![
            "192.0.2.100".parse().unwrap(),
            "192.0.2.101".parse().unwrap(),
        ]);
        let referral = catalog.first_hop_servers(&name("www.example.com."));
        assert_eq!(referral.authorities().len(), 2);
        assert_eq!(referral.authorities()[0].value(), "dns1.");
        assert_eq!(referral.extra_values()[0].value(), "192.0.2.100");
        assert_eq!(referral.extra_values()[1].owner(), &name("dns2."));
    }

    #[test]
    fn installs_reach_only_secondary_zones() {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog.add_zone(example_zone()).unwrap();
        catalog
            .add_zone(Zone::Secondary(SecondaryZone::new(
                name("replica.org."),
                "192.0.2.1:5300".parse().unwrap(),
            )))
            .unwrap();

        assert_eq!(catalog.zone_serial(&name("replica.org.")), None);
        catalog
            .install_zone_entries(
                &name("replica.org."),
                vec![record("replica.org. SOASERIAL 9 60")],
            )
            .unwrap();
        assert_eq!(catalog.zone_serial(&name("replica.org.")), Some(9));

        assert_eq!(
            catalog.install_zone_entries(&name("example.com."), Vec::new()),
            Err(CatalogError::NotSecondary(name("example.com."))),
        );
        assert_eq!(
            catalog.install_zone_entries(&name("missing.net."), Vec::new()),
            Err(CatalogError::UnknownZone(name("missing.net."))),
        );
    }

    #[test]
    fn transfers_are_served_from_primaries_only() {
        let mut catalog = ZoneCatalog::new(Vec::new());
        catalog.add_zone(example_zone()).unwrap();
        catalog
            .add_zone(Zone::Secondary(SecondaryZone::new(
                name("replica.org."),
                "192.0.2.1:5300".parse().unwrap(),
            )))
            .unwrap();

        assert_eq!(catalog.zone_entries(&name("example.com.")).unwrap().len(), 2);
        assert_eq!(catalog.zone_entries(&name("replica.org.")), None);
        assert_eq!(catalog.zone_entries(&name("missing.net.")), None);
    }
}
