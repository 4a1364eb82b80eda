//! Longest-prefix-match routing table (§4.3).
//!
//! Many readers, rare writers: lookups take a read lock over an
//! already-sorted snapshot, writes rebuild the per-prefix bucket under a
//! write lock. A route's bucket (`Vec<Route>`) is kept sorted by
//! `(priority desc, insertion asc)` so the winner for a matched prefix is
//! always `bucket[0]`.

use std::collections::BTreeMap;

use ilc_packet::IlpAddress;
use ilc_service::PeerId;
use parking_lot::RwLock;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug, PartialEq, Eq, Clone)]
    pub enum RouteError {
        SelfRoute {
            display("a route must not resolve to this node's own peer id")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: IlpAddress,
    pub next_hop: PeerId,
    pub priority: i64,
    seq: u64,
}

impl Route {
    pub fn new(prefix: IlpAddress, next_hop: PeerId, priority: i64) -> Self {
        Route {
            prefix,
            next_hop,
            priority,
            seq: 0,
        }
    }
}

struct Inner {
    by_prefix: BTreeMap<String, Vec<Route>>,
    next_seq: u64,
}

/// The process's single routing table instance (§3 Ownership).
pub struct RoutingTable {
    self_id: PeerId,
    inner: RwLock<Inner>,
}

impl RoutingTable {
    pub fn new(self_id: PeerId) -> Self {
        RoutingTable {
            self_id,
            inner: RwLock::new(Inner {
                by_prefix: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Atomically inserts or updates a route. Same-prefix, same-next-hop
    /// routes are replaced in place (keeping the new priority); otherwise
    /// the route is appended to that prefix's bucket and the bucket is
    /// re-sorted.
    pub fn add(&self, prefix: IlpAddress, next_hop: PeerId, priority: i64) -> Result<(), RouteError> {
        if next_hop == self.self_id {
            return Err(RouteError::SelfRoute);
        }
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let bucket = inner.by_prefix.entry(prefix.as_str().to_string()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|r| r.next_hop == next_hop) {
            existing.priority = priority;
        } else {
            bucket.push(Route {
                prefix,
                next_hop,
                priority,
                seq,
            });
        }
        bucket.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        Ok(())
    }

    /// Removes every route under `prefix` destined for `next_hop`. A no-op
    /// if no such route exists.
    pub fn remove(&self, prefix: &IlpAddress, next_hop: &PeerId) {
        let mut inner = self.inner.write();
        if let Some(bucket) = inner.by_prefix.get_mut(prefix.as_str()) {
            bucket.retain(|r| &r.next_hop != next_hop);
            if bucket.is_empty() {
                inner.by_prefix.remove(prefix.as_str());
            }
        }
    }

    /// Replaces the entire route set in one atomic swap.
    pub fn replace_all(&self, routes: Vec<(IlpAddress, PeerId, i64)>) -> Result<(), RouteError> {
        if routes.iter().any(|(_, next_hop, _)| next_hop == &self.self_id) {
            return Err(RouteError::SelfRoute);
        }
        let mut by_prefix: BTreeMap<String, Vec<Route>> = BTreeMap::new();
        let mut seq = 0u64;
        for (prefix, next_hop, priority) in routes {
            let bucket = by_prefix.entry(prefix.as_str().to_string()).or_default();
            bucket.push(Route {
                prefix,
                next_hop,
                priority,
                seq,
            });
            seq += 1;
        }
        for bucket in by_prefix.values_mut() {
            bucket.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        }
        let mut inner = self.inner.write();
        inner.by_prefix = by_prefix;
        inner.next_seq = seq;
        Ok(())
    }

    /// Longest-prefix-match lookup (§4.3). Candidate prefixes are the
    /// segment-aligned truncations of `destination`, checked from longest
    /// to shortest; each candidate is an O(log n) `BTreeMap` lookup, so
    /// the whole call is `O(segments * log n)`.
    pub fn lookup(&self, destination: &IlpAddress) -> Option<Route> {
        let inner = self.inner.read();
        let full = destination.as_str();
        let mut end = full.len();
        loop {
            let candidate = &full[..end];
            if let Some(bucket) = inner.by_prefix.get(candidate) {
                if let Some(winner) = bucket.first() {
                    return Some(winner.clone());
                }
            }
            match full[..end].rfind('.') {
                Some(dot) => end = dot,
                None => break,
            }
        }
        None
    }

    pub fn routes(&self) -> Vec<Route> {
        self.inner
            .read()
            .by_prefix
            .values()
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IlpAddress {
        IlpAddress::new(s).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g"), PeerId::new("a"), 0).unwrap();
        table.add(addr("g.bob"), PeerId::new("b"), 0).unwrap();
        let route = table.lookup(&addr("g.bob.sub")).unwrap();
        assert_eq!(route.next_hop, PeerId::new("b"));
    }

    #[test]
    fn exact_match_beats_shorter_prefix() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g"), PeerId::new("a"), 0).unwrap();
        table.add(addr("g.bob"), PeerId::new("b"), 0).unwrap();
        let route = table.lookup(&addr("g.bob")).unwrap();
        assert_eq!(route.next_hop, PeerId::new("b"));
    }

    #[test]
    fn priority_breaks_ties_within_same_prefix() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g.bob"), PeerId::new("low"), 0).unwrap();
        table.add(addr("g.bob"), PeerId::new("high"), 10).unwrap();
        let route = table.lookup(&addr("g.bob")).unwrap();
        assert_eq!(route.next_hop, PeerId::new("high"));
    }

    #[test]
    fn insertion_order_breaks_remaining_ties() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g.bob"), PeerId::new("first"), 5).unwrap();
        table.add(addr("g.bob"), PeerId::new("second"), 5).unwrap();
        let route = table.lookup(&addr("g.bob")).unwrap();
        assert_eq!(route.next_hop, PeerId::new("first"));
    }

    #[test]
    fn no_match_returns_none() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g.bob"), PeerId::new("b"), 0).unwrap();
        assert!(table.lookup(&addr("test.alice")).is_none());
    }

    #[test]
    fn self_route_rejected() {
        let table = RoutingTable::new(PeerId::new("self"));
        assert_eq!(
            table.add(addr("g.bob"), PeerId::new("self"), 0),
            Err(RouteError::SelfRoute)
        );
    }

    #[test]
    fn prefix_match_is_segment_aligned_not_substring() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g.bob"), PeerId::new("b"), 0).unwrap();
        // "g.bobby" shares the string prefix "g.bob" but not at a segment
        // boundary, so it must not match the g.bob route.
        assert!(table.lookup(&addr("g.bobby")).is_none());
    }

    #[test]
    fn remove_route() {
        let table = RoutingTable::new(PeerId::new("self"));
        table.add(addr("g.bob"), PeerId::new("b"), 0).unwrap();
        table.remove(&addr("g.bob"), &PeerId::new("b"));
        assert!(table.lookup(&addr("g.bob")).is_none());
    }

    #[test]
    fn replace_all_rejects_self_route() {
        let table = RoutingTable::new(PeerId::new("self"));
        let result = table.replace_all(vec![(addr("g.bob"), PeerId::new("self"), 0)]);
        assert_eq!(result, Err(RouteError::SelfRoute));
    }
}
