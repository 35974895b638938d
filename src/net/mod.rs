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

//! The blocking network I/O provider.
//!
//! [`Server`](crate::server::Server) and the transfer state machines
//! are abstracted from sockets; this module wires them up. It runs,
//! inside one [`ThreadGroup`]:
//!
//! - UDP receive workers that dispatch each inbound datagram to a
//!   worker-pool task (one task per query, so slow resolutions never
//!   block the receive loop or each other);
//! - a TCP accept loop handing each inbound zone-transfer connection
//!   to the pool;
//! - one respawnable thread per secondary zone running the transfer
//!   client loop.
//!
//! UDP receives carry a short timeout, and the TCP listener is polled
//! in nonblocking mode, so every loop notices group shutdown within a
//! bounded interval.

use std::io;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};

use crate::db::Authority;
use crate::server::{Exchange, Server};
use crate::thread::{self, ThreadGroup, ThreadPool};
use crate::transfer;

/// The largest datagram the node sends or receives.
pub const MAX_DATAGRAM: usize = 65_535;

/// How long blocking UDP receives wait before checking for shutdown.
const CHECK_FOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a transfer connection may sit idle before it is dropped.
const TRANSFER_READ_TIMEOUT: Duration = Duration::from_secs(30);

////////////////////////////////////////////////////////////////////////
// THE OUTBOUND QUERY TRANSPORT                                       //
////////////////////////////////////////////////////////////////////////

/// The production [`Exchange`]: one ephemeral UDP socket per outbound
/// query, with a configurable receive timeout.
pub struct UdpExchange {
    timeout: Duration,
}

impl UdpExchange {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Exchange for UdpExchange {
    fn exchange(&self, server: SocketAddr, payload: &[u8]) -> io::Result<Vec<u8>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.send_to(payload, server)?;
        let mut buffer = vec![0; MAX_DATAGRAM];
        let (n, _) = socket.recv_from(&mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }
}

////////////////////////////////////////////////////////////////////////
// THE I/O PROVIDER                                                   //
////////////////////////////////////////////////////////////////////////

/// Configuration options for [`NodeIo`].
pub struct NodeIoConfig {
    /// How many receive workers share the UDP socket.
    pub udp_workers: usize,

    /// The base number of pool workers processing queries and
    /// transfer connections.
    pub pool_workers: usize,

    /// How long auxiliary pool workers linger waiting for new work
    /// before exiting.
    pub worker_linger: Duration,
}

impl Default for NodeIoConfig {
    fn default() -> Self {
        Self {
            udp_workers: 2,
            pool_workers: 4,
            worker_linger: Duration::from_secs(30),
        }
    }
}

/// The node's bound sockets: a UDP socket for queries and a TCP
/// listener for inbound zone transfers, on the same address.
pub struct NodeIo {
    config: NodeIoConfig,
    udp_socket: UdpSocket,
    tcp_listener: TcpListener,
}

impl NodeIo {
    /// Binds the sockets. This does not start any thread.
    pub fn bind(address: SocketAddr, config: NodeIoConfig) -> io::Result<Self> {
        let udp_socket = UdpSocket::bind(address)?;
        udp_socket.set_read_timeout(Some(CHECK_FOR_SHUTDOWN_TIMEOUT))?;
        let tcp_listener = TcpListener::bind(address)?;
        tcp_listener.set_nonblocking(true)?;
        Ok(Self {
            config,
            udp_socket,
            tcp_listener,
        })
    }

    /// Starts every worker on the provided [`ThreadGroup`]: the UDP
    /// receive/dispatch workers, the transfer accept loop, and one
    /// transfer client loop per secondary zone.
    pub fn start<A>(
        self,
        server: &Arc<Server<A, UdpExchange>>,
        authority: &Arc<A>,
        group: &Arc<ThreadGroup>,
    ) -> Result<(), thread::Error>
    where
        A: Authority + Send + Sync + 'static,
    {
        let pool = group.start_pool(
            Some("worker".to_owned()),
            self.config.pool_workers,
            self.config.worker_linger,
        )?;

        // The UDP receive/dispatch workers.
        let udp_socket = Arc::new(self.udp_socket);
        for i in 0..self.config.udp_workers {
            let pool = pool.clone();
            let server = server.clone();
            let udp_socket = udp_socket.clone();
            group.start_respawnable(Some(format!("udp worker {i}")), move || {
                log_io_errors(run_udp_worker(&pool, &server, &udp_socket));
            })?;
        }

        // The zone-transfer accept loop.
        {
            let pool = pool.clone();
            let authority = authority.clone();
            let mode = server.mode();
            let tcp_listener = self.tcp_listener;
            group.start_respawnable(Some("transfer listener".to_owned()), move || {
                log_io_errors(run_transfer_listener(&pool, &authority, mode, &tcp_listener));
            })?;
        }

        // One transfer client loop per secondary zone.
        let mode = server.mode();
        for (zone, primary) in authority.secondary_zones() {
            let authority = authority.clone();
            let group_for_task = group.clone();
            group.start_respawnable(Some(format!("transfer client {zone}")), move || {
                transfer::secondary::run(&*authority, &zone, primary, mode, &group_for_task);
            })?;
        }

        Ok(())
    }
}

/// The UDP receive loop: each datagram becomes one pool task.
fn run_udp_worker<A>(
    pool: &Arc<ThreadPool>,
    server: &Arc<Server<A, UdpExchange>>,
    socket: &Arc<UdpSocket>,
) -> io::Result<()>
where
    A: Authority + Send + Sync + 'static,
{
    let mut buffer = vec![0; MAX_DATAGRAM];
    loop {
        if pool.is_shutting_down() {
            return Ok(());
        }

        let (n, peer) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) if would_block(&e) => continue,
            Err(e) => return Err(e),
        };

        let datagram = buffer[..n].to_vec();
        let server = server.clone();
        let socket = socket.clone();
        let submission = pool.submit_or_spawn(move || {
            if let Some(reply) = server.handle_message(&datagram, peer) {
                if let Err(e) = socket.send_to(&reply, peer) {
                    warn!("failed to send reply to {peer}: {e}");
                }
            }
        });
        match submission {
            Ok(()) => (),
            Err(thread::Error::ShuttingDown) => return Ok(()),
            Err(thread::Error::Io(e)) => return Err(e),
        }
    }
}

/// The zone-transfer accept loop: each connection becomes one pool
/// task running the primary-side responder.
fn run_transfer_listener<A>(
    pool: &Arc<ThreadPool>,
    authority: &Arc<A>,
    mode: crate::codec::WireMode,
    listener: &TcpListener,
) -> io::Result<()>
where
    A: Authority + Send + Sync + 'static,
{
    loop {
        if pool.is_shutting_down() {
            return Ok(());
        }

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if would_block(&e) => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => return Err(e),
        };

        // The stream can inherit nonblocking mode from the listener.
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(TRANSFER_READ_TIMEOUT))?;

        let authority = authority.clone();
        let submission = pool.submit_or_spawn(move || {
            if let Err(e) = transfer::primary::serve(stream, &*authority, peer.ip(), mode) {
                warn!("transfer connection from {peer} failed: {e}");
            }
        });
        match submission {
            Ok(()) => (),
            Err(thread::Error::ShuttingDown) => return Ok(()),
            Err(thread::Error::Io(e)) => return Err(e),
        }
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut,
    )
}

fn log_io_errors(result: io::Result<()>) {
    if let Err(e) = result {
        error!("I/O task failed: {e}");
    }
}
