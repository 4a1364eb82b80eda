//! Origin allowlist for the explorer's HTTP/WS surface (§4.12 CORS).
//!
//! Exact strings match literally; entries ending in `*` match by prefix,
//! so `https://*.example.com` allows any subdomain. `warp::cors()` only
//! accepts a static list of origins, so this crate does its own check and
//! builds response headers by hand.

#[derive(Debug, Clone)]
pub struct OriginAllowlist {
    entries: Vec<String>,
}

impl OriginAllowlist {
    pub fn new(entries: Vec<String>) -> Self {
        OriginAllowlist { entries }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.entries.iter().any(|entry| match entry.strip_suffix('*') {
            Some(prefix) => origin.starts_with(prefix),
            None => entry == origin,
        })
    }
}
