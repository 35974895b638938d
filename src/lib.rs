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

//! Caravel is a simplified hierarchical name-service node. A single
//! process can act as the authoritative primary for some zones, an
//! authoritative secondary for others, and (optionally) a recursive
//! resolver for everything else.
//!
//! The crate is organized around four cores:
//!
//! - the wire protocol ([`rr`], [`message`], [`codec`]): resource
//!   records and query/response messages, each with a human-readable
//!   text encoding and a compact binary encoding;
//! - the resolution engine ([`server`]): local authority data, then the
//!   TTL [`cache`], then a bounded iterative delegation walk;
//! - the authority database ([`db`], [`zone_file`]): primary zones
//!   loaded from zone files and secondary zones replicated over the
//!   network;
//! - the zone-transfer protocol ([`transfer`]): the stream-framed
//!   state machines a secondary uses to pull a versioned snapshot of a
//!   primary's zone data.
//!
//! Network plumbing lives in [`net`], which drives everything with
//! blocking I/O on the worker threads provided by [`thread`].

pub mod cache;
pub mod codec;
pub mod db;
pub mod message;
pub mod name;
pub mod net;
pub mod rr;
pub mod server;
pub mod thread;
pub mod transfer;
pub mod zone_file;

mod util;
