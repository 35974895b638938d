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

//! The record cache.
//!
//! The cache stores records learned during resolution until their TTLs
//! lapse, and memoizes definitive empty answers for a short, fixed
//! window so that repeated queries for missing names do not restart
//! the delegation walk each time.
//!
//! Eviction is TTL-only: expired lines are purged lazily on lookup and
//! there is no capacity bound. All state sits behind a single mutex;
//! contention is expected to be low.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::message::{QueryInfo, QueryResponse};
use crate::rr::Record;

////////////////////////////////////////////////////////////////////////
// CACHE                                                              //
////////////////////////////////////////////////////////////////////////

/// How long a definitive empty answer is memoized.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// A TTL-expiring store of records plus a negative-answer memo.
#[derive(Default)]
pub struct Cache {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    lines: Vec<Line>,
    negative: HashMap<QueryInfo, Instant>,
}

/// One cached record and the instant it stops being valid.
struct Line {
    record: Record,
    expires_at: Instant,
}

impl Cache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single record, valid for its TTL from now.
    pub fn add_record(&self, record: Record) {
        self.add_record_at(record, Instant::now());
    }

    /// Adds every record of a response (values, authorities, and
    /// glue). If `query` is given and the response is a definitive
    /// empty answer, a negative hit is memoized for that exact query
    /// for [`NEGATIVE_TTL`].
    pub fn add_response(&self, response: &QueryResponse, query: Option<&QueryInfo>) {
        self.add_response_at(response, query, Instant::now());
    }

    /// Answers `query` from the still-valid cached records, purging
    /// expired lines along the way. A live negative memo short-circuits
    /// to a final empty response.
    pub fn lookup(&self, query: &QueryInfo) -> QueryResponse {
        self.lookup_at(query, Instant::now())
    }

    fn add_record_at(&self, record: Record, now: Instant) {
        let expires_at = now + record.ttl().as_duration();
        self.inner.lock().unwrap().lines.push(Line { record, expires_at });
    }

    fn add_response_at(&self, response: &QueryResponse, query: Option<&QueryInfo>, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        for record in response.records() {
            let expires_at = now + record.ttl().as_duration();
            inner.lines.push(Line {
                record: record.clone(),
                expires_at,
            });
        }
        if let Some(query) = query {
            if response.is_final() && response.values().is_empty() {
                inner.negative.insert(query.clone(), now + NEGATIVE_TTL);
            }
        }
    }

    fn lookup_at(&self, query: &QueryInfo, now: Instant) -> QueryResponse {
        let mut inner = self.inner.lock().unwrap();

        match inner.negative.get(query) {
            Some(&deadline) if deadline >= now => {
                return QueryResponse::new(Vec::new(), Vec::new(), Vec::new(), true, false);
            }
            Some(_) => {
                inner.negative.remove(query);
            }
            None => (),
        }

        inner.lines.retain(|line| line.expires_at >= now);
        let records: Vec<Record> = inner.lines.iter().map(|l| l.record.clone()).collect();
        QueryResponse::from_records(query, &records, false, false)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::RecordType;

    fn record(text: &str) -> Record {
        text.parse().unwrap()
    }

    fn query(name: &str, rtype: RecordType) -> QueryInfo {
        QueryInfo::new(name.parse().unwrap(), rtype)
    }

    #[test]
    fn records_expire_after_their_ttl() {
        let cache = Cache::new();
        let base = Instant::now();
        cache.add_record_at(record("www.example.com. A 192.0.2.1 1"), base);

        let q = query("www.example.com.", RecordType::A);
        assert_eq!(cache.lookup_at(&q, base).values().len(), 1);
        assert_eq!(
            cache
                .lookup_at(&q, base + Duration::from_secs(2))
                .values()
                .len(),
            0,
        );
    }

    #[test]
    fn long_lived_records_stay() {
        let cache = Cache::new();
        let base = Instant::now();
        cache.add_record_at(record("www.example.com. A 192.0.2.1 1000"), base);

        let q = query("www.example.com.", RecordType::A);
        let response = cache.lookup_at(&q, base + Duration::from_secs(1));
        assert_eq!(response.values().len(), 1);
        assert!(response.is_final());
        assert!(!response.is_authoritative());
    }

    #[test]
    fn negative_memo_answers_until_it_lapses() {
        let cache = Cache::new();
        let base = Instant::now();
        let q = query("missing.example.com.", RecordType::A);

        // Even with a live record that would otherwise produce
        // authorities, the memo wins.
        cache.add_record_at(record("example.com. NS ns1.example.com. 86400"), base);
        let negative = QueryResponse::new(Vec::new(), Vec::new(), Vec::new(), true, true);
        cache.add_response_at(&negative, Some(&q), base);

        let hit = cache.lookup_at(&q, base + Duration::from_secs(59));
        assert!(hit.is_final());
        assert!(hit.values().is_empty());
        assert!(hit.authorities().is_empty());

        // Past the 60 s window the memo is gone and the NS record
        // shows through again.
        let miss = cache.lookup_at(&q, base + Duration::from_secs(61));
        assert!(!miss.is_final());
        assert_eq!(miss.authorities().len(), 1);
    }

    #[test]
    fn negative_memo_requires_an_originating_query() {
        let cache = Cache::new();
        let base = Instant::now();
        let q = query("missing.example.com.", RecordType::A);

        let negative = QueryResponse::new(Vec::new(), Vec::new(), Vec::new(), true, true);
        cache.add_response_at(&negative, None, base);
        assert!(!cache.lookup_at(&q, base).is_final());
    }

    #[test]
    fn responses_are_cached_with_their_glue() {
        let cache = Cache::new();
        let base = Instant::now();
        let referral = QueryResponse::new(
            Vec::new(),
            vec![record("example.com. NS ns1.example.com. 86400")],
            vec![record("ns1.example.com. A 192.0.2.53 86400")],
            false,
            false,
        );
        cache.add_response_at(&referral, None, base);

        let response = cache.lookup_at(&query("www.example.com.", RecordType::A), base);
        assert!(!response.is_final());
        assert_eq!(response.authorities().len(), 1);
        assert_eq!(response.extra_values().len(), 1);
    }
}
