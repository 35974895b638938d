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

//! The resolution engine: the decision algorithm behind every answer.

use std::net::{Ipv4Addr, SocketAddr};

use log::{debug, info, warn};
use rand::Rng;

use super::{Exchange, Server};
use crate::db::Authority;
use crate::message::{Message, QueryInfo, QueryResponse, MAX_ID, MIN_ID};
use crate::rr::RecordType;

impl<A, X> Server<A, X>
where
    A: Authority,
    X: Exchange,
{
    /// Resolves a query.
    ///
    /// Local authority data always wins; after that the cache; after
    /// that, in non-recursive mode, the answer is a referral to the
    /// configured first-hop servers and the network is never touched.
    /// In recursive mode the engine walks the delegation hierarchy
    /// from the first hop, caching what it learns, until it obtains a
    /// final answer, runs out of servers to ask, or exceeds the hop
    /// bound.
    pub fn resolve(&self, info: &QueryInfo, recursive: bool) -> QueryResponse {
        let answer = self.authority.answer_query(info);
        if answer.is_final() {
            return answer;
        }

        let answer = self.cache.lookup(info);
        if answer.is_final() {
            return answer;
        }

        let referral = self.authority.first_hop_servers(&info.name);
        if !recursive {
            return referral;
        }

        self.cache.add_response(&referral, None);
        let mut previous = referral;
        for _ in 0..self.max_hops {
            let candidates = self.delegate_addresses(&previous);
            let answer = match self.query_any(&candidates, info) {
                Some(answer) => answer,
                None => return previous,
            };
            if answer.is_final() {
                self.cache.add_response(&answer, Some(info));
                return answer;
            }
            previous = answer;
        }
        warn!(
            "delegation walk for {info} exceeded {} hops; answering with the best referral",
            self.max_hops,
        );
        previous
    }

    /// Orders the delegation addresses to try next from a referral:
    /// authorities sorted from least to most specific (broadest
    /// delegations first), each contributing the addresses of its glue
    /// A records in turn.
    fn delegate_addresses(&self, referral: &QueryResponse) -> Vec<SocketAddr> {
        let mut authorities: Vec<_> = referral.authorities().iter().collect();
        authorities.sort_by_key(|authority| authority.owner().label_count());

        let mut addresses = Vec::new();
        for authority in authorities {
            let target = match authority.value_as_name() {
                Some(target) => target,
                None => continue,
            };
            for glue in referral.extra_values() {
                if glue.rtype() != RecordType::A || *glue.owner() != target {
                    continue;
                }
                match glue.value().parse::<Ipv4Addr>() {
                    Ok(ip) => {
                        let address = SocketAddr::from((ip, self.remote_port));
                        if !addresses.contains(&address) {
                            addresses.push(address);
                        }
                    }
                    Err(_) => debug!("glue record for {target} has no usable address"),
                }
            }
        }
        addresses
    }

    /// Queries each candidate in order and keeps the first response
    /// received; remaining candidates are not tried once one answers.
    fn query_any(&self, candidates: &[SocketAddr], info: &QueryInfo) -> Option<QueryResponse> {
        candidates
            .iter()
            .find_map(|&server| self.query_one(server, info))
    }

    /// One outbound query/response exchange. A timeout, an undecodable
    /// reply, or a reply that is itself a query all count as
    /// no-answer; none of them is fatal to the resolution.
    fn query_one(&self, server: SocketAddr, info: &QueryInfo) -> Option<QueryResponse> {
        let id = rand::thread_rng().gen_range(MIN_ID..=MAX_ID);
        let message = match Message::query(id, info.clone(), true) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to build outbound query for {info}: {e}");
                return None;
            }
        };
        let payload = match self.mode.encode_message(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode outbound query for {info}: {e}");
                return None;
            }
        };

        let reply = match self.exchange.exchange(server, &payload) {
            Ok(reply) => reply,
            Err(e) => {
                info!("no answer from {server} for {info}: {e}");
                return None;
            }
        };

        match self.mode.decode_message(&reply) {
            Ok(Message::Response { response, .. }) => Some(response),
            Ok(Message::Query { .. }) => {
                warn!("{server} answered {info} with a query");
                None
            }
            Err(e) => {
                warn!("undecodable answer from {server} for {info}: {e}");
                None
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
