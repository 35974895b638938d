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

//! Implements the daemon configuration file.
//!
//! An example configuration:
//!
//! ```toml
//! bind = "0.0.0.0:5353"
//! mode = "binary"
//! resolver = true
//! top_servers = ["192.0.2.100", "192.0.2.101"]
//!
//! [delegations]
//! "corp.example.com." = "10.1.0.1"
//!
//! [[zone]]
//! role = "primary"
//! name = "example.com."
//! file = "example.com.db"
//! allow_transfer = ["10.0.0.2"]
//!
//! [[zone]]
//! role = "secondary"
//! name = "other.org."
//! primary = "10.0.0.3:5353"
//! ```

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use caravel::codec::WireMode;
use caravel::net::NodeIoConfig;
use caravel::server::{DEFAULT_MAX_HOPS, DEFAULT_REMOTE_PORT};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the daemon configuration from the file given by `path`.
/// Relative zone file paths are interpreted relative to the
/// configuration file's directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;

    for zone_config in &mut config.zones {
        if let ZoneConfig::Primary { file, .. } = zone_config {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }
    }
    Ok(config)
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION STRUCTURES                                           //
////////////////////////////////////////////////////////////////////////

/// The daemon configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The address the UDP query socket and the TCP transfer listener
    /// bind to.
    pub bind: SocketAddr,

    /// The wire encoding this node (and its peers) speak.
    #[serde(default)]
    pub mode: Mode,

    /// Whether this node is a recursive resolver.
    #[serde(default)]
    pub resolver: bool,

    /// How long to wait for the reply to one outbound query, in
    /// milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// The bound on delegation-walk iterations.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// The port outbound queries are sent to.
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// The root servers a resolution starts from when no default
    /// delegation matches.
    #[serde(default)]
    pub top_servers: Vec<Ipv4Addr>,

    /// Default delegations: domain name to server address.
    #[serde(default)]
    pub delegations: HashMap<String, Ipv4Addr>,

    /// The zones this node is authoritative for.
    #[serde(default, rename = "zone")]
    pub zones: Vec<ZoneConfig>,

    #[serde(default)]
    pub io: IoConfig,
}

/// The wire encoding, as configured.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub enum Mode {
    #[serde(rename = "text")]
    Text,
    #[default]
    #[serde(rename = "binary")]
    Binary,
}

impl From<Mode> for WireMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Text => WireMode::Text,
            Mode::Binary => WireMode::Binary,
        }
    }
}

/// The configuration of one zone.
#[derive(Debug, Deserialize)]
#[serde(tag = "role")]
pub enum ZoneConfig {
    #[serde(rename = "primary")]
    Primary {
        name: String,
        file: PathBuf,
        #[serde(default)]
        allow_transfer: Vec<IpAddr>,
    },
    #[serde(rename = "secondary")]
    Secondary { name: String, primary: SocketAddr },
}

impl ZoneConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Primary { name, .. } | Self::Secondary { name, .. } => name,
        }
    }
}

/// I/O provider tuning.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    #[serde(default = "default_udp_workers")]
    pub udp_workers: usize,

    #[serde(default = "default_pool_workers")]
    pub pool_workers: usize,

    #[serde(default = "default_worker_linger_ms")]
    pub worker_linger_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            udp_workers: default_udp_workers(),
            pool_workers: default_pool_workers(),
            worker_linger_ms: default_worker_linger_ms(),
        }
    }
}

impl From<&IoConfig> for NodeIoConfig {
    fn from(config: &IoConfig) -> Self {
        Self {
            udp_workers: config.udp_workers,
            pool_workers: config.pool_workers,
            worker_linger: Duration::from_millis(config.worker_linger_ms),
        }
    }
}

fn default_query_timeout_ms() -> u64 {
    2000
}

fn default_max_hops() -> usize {
    DEFAULT_MAX_HOPS
}

fn default_remote_port() -> u16 {
    DEFAULT_REMOTE_PORT
}

fn default_udp_workers() -> usize {
    NodeIoConfig::default().udp_workers
}

fn default_pool_workers() -> usize {
    NodeIoConfig::default().pool_workers
}

fn default_worker_linger_ms() -> u64 {
    NodeIoConfig::default().worker_linger.as_millis() as u64
}
