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

//! The query-processing logic of a name-service node.
//!
//! The [`Server`] structure is the heart of this module. It is
//! abstracted from any underlying network I/O provider: inbound
//! datagrams are submitted through [`Server::handle_message`], and
//! outbound queries of the delegation walk leave through the
//! [`Exchange`] trait. The [`net`](crate::net) module wires both ends
//! to real sockets; tests substitute scripted implementations.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, warn};

use crate::cache::Cache;
use crate::codec::WireMode;
use crate::db::Authority;
use crate::message::Message;

mod resolver;

////////////////////////////////////////////////////////////////////////
// THE OUTBOUND QUERY TRANSPORT                                       //
////////////////////////////////////////////////////////////////////////

/// Trait for the outbound query transport.
///
/// One call is one query/response exchange with one remote server: the
/// implementation sends `payload` as a datagram and blocks for the
/// reply, bounded by its configured timeout. A timeout or any other
/// I/O failure is reported as an error; the resolution engine treats
/// it as "this candidate did not answer" and moves on.
pub trait Exchange {
    fn exchange(&self, server: SocketAddr, payload: &[u8]) -> io::Result<Vec<u8>>;
}

////////////////////////////////////////////////////////////////////////
// THE SERVER                                                         //
////////////////////////////////////////////////////////////////////////

/// The default bound on delegation-walk iterations.
pub const DEFAULT_MAX_HOPS: usize = 16;

/// The default port outbound queries are sent to.
pub const DEFAULT_REMOTE_PORT: u16 = 53;

/// A name-service node, abstracted from network I/O.
///
/// The `Server` answers queries from its [`Authority`] data source,
/// then from its [`Cache`]. When it is configured as a resolver and
/// the client asked for recursion, it then walks the
/// delegation hierarchy through its [`Exchange`] transport.
pub struct Server<A, X> {
    authority: Arc<A>,
    cache: Cache,
    exchange: X,
    mode: WireMode,
    recursion: bool,
    max_hops: usize,
    remote_port: u16,
}

impl<A, X> Server<A, X> {
    /// Creates a new `Server` over the given authority data and
    /// outbound transport. Recursion is disabled by default.
    pub fn new(authority: Arc<A>, exchange: X, mode: WireMode) -> Self {
        Self {
            authority,
            cache: Cache::new(),
            exchange,
            mode,
            recursion: false,
            max_hops: DEFAULT_MAX_HOPS,
            remote_port: DEFAULT_REMOTE_PORT,
        }
    }

    /// Enables or disables the resolver role. A resolver answers
    /// queries about any domain and honors recursion-desired.
    pub fn set_recursion(&mut self, recursion: bool) {
        self.recursion = recursion;
    }

    /// Sets the bound on delegation-walk iterations.
    pub fn set_max_hops(&mut self, max_hops: usize) {
        self.max_hops = max_hops;
    }

    /// Sets the port outbound queries are sent to.
    pub fn set_remote_port(&mut self, port: u16) {
        self.remote_port = port;
    }

    /// Returns the wire mode this server speaks.
    pub fn mode(&self) -> WireMode {
        self.mode
    }
}

impl<A, X> Server<A, X>
where
    A: Authority,
    X: Exchange,
{
    /// Handles a received message. This is the API through which I/O
    /// providers submit inbound datagrams.
    ///
    /// Returns the encoded reply to send back, or `None` when the
    /// message should be dropped without an answer (a query outside
    /// the domains this node serves).
    pub fn handle_message(&self, octets: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let message = match self.mode.decode_message(octets) {
            Ok(message) => message,
            Err(e) => {
                warn!("malformed message from {peer}: {e}");
                let reply = Message::decode_failure_response(self.recursion);
                return self.encode_reply(&reply, peer);
            }
        };

        let (info, recursion_desired) = match &message {
            Message::Response { .. } => {
                warn!("received a response from {peer} where a query was expected");
                let reply = message.error_response(self.recursion);
                return self.encode_reply(&reply, peer);
            }
            Message::Query {
                info,
                recursion_desired,
                ..
            } => (info, *recursion_desired),
        };

        if !self.recursion && !self.authority.answers(&info.name) {
            debug!("dropping query for {info} from {peer}: not served here");
            return None;
        }

        let response = self.resolve(info, recursion_desired && self.recursion);
        let reply = message.respond(response, self.recursion);
        self.encode_reply(&reply, peer)
    }

    fn encode_reply(&self, reply: &Message, peer: SocketAddr) -> Option<Vec<u8>> {
        match self.mode.encode_message(reply) {
            Ok(octets) => Some(octets),
            Err(e) => {
                warn!("failed to encode reply to {peer}: {e}");
                None
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
