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

//! Runs the daemon.

use std::fmt::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use caravel::codec::WireMode;
use caravel::db::ZoneCatalog;
use caravel::net::{NodeIo, UdpExchange};
use caravel::server::Server;
use caravel::thread::ThreadGroup;

use crate::args::Args;
use crate::config;
use crate::zones;

/// Runs the daemon, exiting the process on failure.
pub fn run(args: Args) {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(args: Args) -> Result<()> {
    info!(
        "Caravel daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    info!("Loading the configuration from {}.", args.config.display());
    let config =
        config::load_from_path(&args.config).context("failed to load the configuration")?;

    let bind = args.bind.unwrap_or(config.bind);
    let mode = if args.text {
        WireMode::Text
    } else {
        config.mode.into()
    };
    let resolver = args.resolver || config.resolver;

    // Bind before loading zones, so an unusable address fails fast.
    let io = NodeIo::bind(bind, (&config.io).into()).context("failed to bind sockets")?;
    info!("Listening on {bind} ({mode:?} wire mode).");

    let catalog: Arc<ZoneCatalog> =
        Arc::new(zones::build_catalog(&config).context("failed to build the zone catalog")?);

    let exchange = UdpExchange::new(Duration::from_millis(config.query_timeout_ms));
    let mut server = Server::new(catalog.clone(), exchange, mode);
    server.set_recursion(resolver);
    server.set_max_hops(config.max_hops);
    server.set_remote_port(config.remote_port);
    let server = Arc::new(server);

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to set up signal handling")?;

    info!("Set-up is complete; starting the server.");
    let group = ThreadGroup::new();
    io.start(&server, &catalog, &group)
        .context("failed to start the I/O provider")?;

    if let Some(signal) = signals.forever().next() {
        let name = match signal {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            _ => unreachable!(),
        };
        info!("Received {name}; shutting down.");
    }

    group.shut_down();
    group.await_shutdown();
    info!("Shutdown complete.");
    Ok(())
}
