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

//! Command-line argument handling.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// A simplified hierarchical name-service node.
#[derive(Debug, Parser)]
#[command(name = "caraveld", version)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the configured bind address.
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Run as a recursive resolver regardless of the configuration.
    #[arg(short, long)]
    pub resolver: bool,

    /// Speak the text wire encoding regardless of the configuration.
    #[arg(long)]
    pub text: bool,
}
