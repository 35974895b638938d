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

//! Builds the zone catalog from the configuration.

use anyhow::{anyhow, Context, Result};
use log::info;

use caravel::db::{PrimaryZone, SecondaryZone, Zone, ZoneCatalog};
use caravel::name::Name;
use caravel::zone_file;

use crate::config::{Config, ZoneConfig};

/// Builds the [`ZoneCatalog`], loading every primary zone's database
/// file. Any failure here is fatal to startup: a node must not come up
/// serving a subset of its configured zones.
pub fn build_catalog(config: &Config) -> Result<ZoneCatalog> {
    let mut catalog = ZoneCatalog::new(config.top_servers.clone());

    for (name, addr) in &config.delegations {
        let name: Name = name
            .parse()
            .map_err(|e| anyhow!("invalid delegation domain {name}: {e}"))?;
        catalog
            .add_delegation(name, *addr)
            .context("failed to add default delegation")?;
    }

    for zone_config in &config.zones {
        let name: Name = zone_config
            .name()
            .parse()
            .map_err(|e| anyhow!("invalid zone name {}: {e}", zone_config.name()))?;
        let zone = match zone_config {
            ZoneConfig::Primary {
                file,
                allow_transfer,
                ..
            } => {
                let data = zone_file::load(file)
                    .with_context(|| format!("failed to load the zone file for {name}"))?;
                if data.origin != name {
                    return Err(anyhow!(
                        "the origin of {} ({}) does not match the zone name {name}",
                        file.display(),
                        data.origin,
                    ));
                }
                let zone = PrimaryZone::new(name.clone(), data.records, allow_transfer.clone())
                    .with_context(|| format!("failed to build the primary zone {name}"))?;
                info!(
                    "loaded primary zone {name} (serial {}, {} records)",
                    zone.serial(),
                    zone.records().len(),
                );
                Zone::Primary(zone)
            }
            ZoneConfig::Secondary { primary, .. } => {
                info!("configured secondary zone {name} (primary {primary})");
                Zone::Secondary(SecondaryZone::new(name.clone(), *primary))
            }
        };
        catalog
            .add_zone(zone)
            .with_context(|| format!("failed to add the zone {name}"))?;
    }

    Ok(catalog)
}
