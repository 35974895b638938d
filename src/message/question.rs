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

//! Queries and the answers to them: the [`QueryInfo`] and
//! [`QueryResponse`] types and the record-matching rules shared by the
//! authority database, the cache, and the resolution engine.

use std::fmt;

use crate::name::Name;
use crate::rr::{Record, RecordType};

////////////////////////////////////////////////////////////////////////
// QUERY INFO                                                         //
////////////////////////////////////////////////////////////////////////

/// A request key: the queried name and record type.
///
/// `QueryInfo` is `Eq + Hash` so the cache can use it directly as the
/// key of its negative-answer memo.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct QueryInfo {
    pub name: Name,
    pub rtype: RecordType,
}

impl QueryInfo {
    pub fn new(name: Name, rtype: RecordType) -> Self {
        Self { name, rtype }
    }
}

impl fmt::Display for QueryInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.name, self.rtype)
    }
}

////////////////////////////////////////////////////////////////////////
// QUERY RESPONSES                                                    //
////////////////////////////////////////////////////////////////////////

/// The result of resolving a query.
///
/// A response holds up to one directly answering record in `values`
/// (the lowest-priority match; see [`QueryResponse::from_records`]),
/// the NS records delegating toward the answer in `authorities`, and
/// the A records resolving the hosts those delegations name (the glue)
/// in `extra_values`.
///
/// A response is *final* when it definitively settles the query:
/// either it carries values, or it was explicitly marked final (an
/// authoritative statement that the name has no such records). It is
/// *authoritative* when it was produced from a zone's own authority
/// data rather than from the cache or a delegation chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryResponse {
    values: Vec<Record>,
    authorities: Vec<Record>,
    extra_values: Vec<Record>,
    final_answer: bool,
    authoritative: bool,
}

impl QueryResponse {
    /// Creates a response from its parts. A response with a non-empty
    /// `values` list is final regardless of the `final_answer`
    /// argument.
    pub fn new(
        values: Vec<Record>,
        authorities: Vec<Record>,
        extra_values: Vec<Record>,
        final_answer: bool,
        authoritative: bool,
    ) -> Self {
        let final_answer = final_answer || !values.is_empty();
        Self {
            values,
            authorities,
            extra_values,
            final_answer,
            authoritative,
        }
    }

    /// Creates an empty, non-final, non-authoritative response.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new(), false, false)
    }

    /// Searches `records` for an answer to `query` and builds a
    /// response from the relevant values, authorities, and glue.
    ///
    /// The matching rules:
    ///
    /// - *Values*: among the records matching the query's name and
    ///   type, only the one with the lowest priority is kept (the
    ///   first such record on ties).
    /// - *Authorities*: the NS records whose owner is an
    ///   ancestor-or-self of the queried name, one per owner (again
    ///   keeping the lowest priority).
    /// - *Glue*: for every domain named by the retained values (the
    ///   values of SOASP, NS, and MX records) and by the authorities,
    ///   every A record owning that domain.
    pub fn from_records(
        query: &QueryInfo,
        records: &[Record],
        final_answer: bool,
        authoritative: bool,
    ) -> Self {
        let mut best: Option<&Record> = None;
        for record in records {
            if record.rtype() == query.rtype && *record.owner() == query.name {
                match best {
                    Some(b) if b.priority() <= record.priority() => (),
                    _ => best = Some(record),
                }
            }
        }
        let values: Vec<Record> = best.cloned().into_iter().collect();

        let mut authorities: Vec<Record> = Vec::new();
        for record in records {
            if record.rtype() == RecordType::Ns && query.name.is_subdomain_of(record.owner()) {
                match authorities.iter_mut().find(|a| a.owner() == record.owner()) {
                    Some(existing) => {
                        if record.priority() < existing.priority() {
                            *existing = record.clone();
                        }
                    }
                    None => authorities.push(record.clone()),
                }
            }
        }

        let mut referenced: Vec<Name> = Vec::new();
        let mut refer = |name: Option<Name>| {
            if let Some(name) = name {
                if !referenced.contains(&name) {
                    referenced.push(name);
                }
            }
        };
        for record in &values {
            if matches!(
                record.rtype(),
                RecordType::SoaOrigin | RecordType::Ns | RecordType::Mx,
            ) {
                refer(record.value_as_name());
            }
        }
        for record in &authorities {
            refer(record.value_as_name());
        }

        let mut extra_values = Vec::new();
        for name in &referenced {
            for record in records {
                if record.rtype() == RecordType::A && record.owner() == name {
                    extra_values.push(record.clone());
                }
            }
        }

        Self::new(values, authorities, extra_values, final_answer, authoritative)
    }

    /// Returns the records directly answering the query.
    pub fn values(&self) -> &[Record] {
        &self.values
    }

    /// Returns the NS records delegating toward the answer.
    pub fn authorities(&self) -> &[Record] {
        &self.authorities
    }

    /// Returns the glue records for the authorities and values.
    pub fn extra_values(&self) -> &[Record] {
        &self.extra_values
    }

    /// Iterates over every record in the response: values, then
    /// authorities, then glue.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.values
            .iter()
            .chain(self.authorities.iter())
            .chain(self.extra_values.iter())
    }

    /// Returns whether this response definitively settles its query.
    pub fn is_final(&self) -> bool {
        self.final_answer
    }

    /// Returns whether this response came from a zone's own authority
    /// data.
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
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

    fn query(name: &str, rtype: RecordType) -> QueryInfo {
        QueryInfo::new(name.parse().unwrap(), rtype)
    }

    #[test]
    fn lowest_priority_value_wins() {
        let records = [
            record("www.example.com. A 192.0.2.1 300 5"),
            record("www.example.com. A 192.0.2.2 300 2"),
            record("www.example.com. A 192.0.2.3 300 7"),
        ];
        let response = QueryResponse::from_records(
            &query("www.example.com.", RecordType::A),
            &records,
            false,
            false,
        );
        assert_eq!(response.values(), &records[1..2]);
        assert!(response.is_final());
    }

    #[test]
    fn value_ties_keep_the_first_record() {
        let records = [
            record("www.example.com. A 192.0.2.1 300 2"),
            record("www.example.com. A 192.0.2.2 300 2"),
        ];
        let response = QueryResponse::from_records(
            &query("www.example.com.", RecordType::A),
            &records,
            false,
            false,
        );
        assert_eq!(response.values(), &records[..1]);
    }

    #[test]
    fn authorities_come_from_ancestors_with_glue() {
        let records = [
            record("com. NS ns.com. 86400"),
            record("example.com. NS ns1.example.com. 86400"),
            record("other.org. NS ns.other.org. 86400"),
            record("ns.com. A 192.0.2.10 86400"),
            record("ns1.example.com. A 192.0.2.11 86400"),
            record("ns.other.org. A 192.0.2.12 86400"),
        ];
        let response = QueryResponse::from_records(
            &query("www.example.com.", RecordType::Mx),
            &records,
            false,
            false,
        );
        assert!(!response.is_final());
        assert_eq!(response.values(), &[]);
        assert_eq!(
            response.authorities(),
            &[records[0].clone(), records[1].clone()],
        );
        assert_eq!(
            response.extra_values(),
            &[records[3].clone(), records[4].clone()],
        );
    }

    #[test]
    fn one_authority_per_owner_by_priority() {
        let records = [
            record("example.com. NS ns1.example.com. 86400 4"),
            record("example.com. NS ns2.example.com. 86400 1"),
        ];
        let response = QueryResponse::from_records(
            &query("www.example.com.", RecordType::A),
            &records,
            false,
            false,
        );
        assert_eq!(response.authorities(), &records[1..2]);
    }

    #[test]
    fn mx_values_pull_their_glue() {
        let records = [
            record("example.com. MX mail.example.com. 3600 10"),
            record("mail.example.com. A 192.0.2.25 3600"),
        ];
        let response = QueryResponse::from_records(
            &query("example.com.", RecordType::Mx),
            &records,
            false,
            false,
        );
        assert_eq!(response.values(), &records[..1]);
        assert_eq!(response.extra_values(), &records[1..2]);
    }

    #[test]
    fn nonempty_values_force_final() {
        let response = QueryResponse::new(
            vec![record("www.example.com. A 192.0.2.1 300")],
            Vec::new(),
            Vec::new(),
            false,
            false,
        );
        assert!(response.is_final());
        assert!(!QueryResponse::empty().is_final());
    }
}
