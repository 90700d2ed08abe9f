use std::{collections::VecDeque, fmt, net::SocketAddr, time::Duration};

use ahash::HashMap;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderName,
};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Whoever the rate limit is applied to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// used when the transport doesn't tell us who is calling
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a request is mapped to a [`ClientId`]
///
/// None of these are authenticated: a peer address can be spoofed and a
/// header can be set to anything
#[derive(Debug, Clone, Default)]
pub enum ClientIdentity {
    /// ip address of the peer, as reported by the transport
    #[default]
    PeerAddress,
    /// value of a header, such as an api key. falls back to the peer address
    Header(HeaderName),
}

impl ClientIdentity {
    pub fn identify(&self, request: &Request) -> ClientId {
        if let ClientIdentity::Header(name) = self {
            let value = request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                return ClientId::new(format!("{name}:{value}"));
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| ClientId::new(addr.ip().to_string()))
            .unwrap_or_else(ClientId::unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after: Duration },
}

/// Sliding window rate limiter, keyed by client
///
/// A client is allowed `limit` requests in any `window` long stretch of time
pub struct RateLimiter {
    windows: Mutex<HashMap<ClientId, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            windows: Default::default(),
            limit,
            window,
        }
    }

    pub fn admit(&self, client: &ClientId) -> Admission {
        let mut windows = self.windows.lock();
        // read under the lock so each window stays in timestamp order
        let now = Instant::now();

        let times = windows.entry(client.clone()).or_default();
        prune(times, now, self.window);

        if times.len() >= self.limit {
            // rejected requests don't count towards the limit
            let retry_after = times
                .front()
                .map(|oldest| self.window.saturating_sub(now - *oldest))
                .unwrap_or(self.window);
            return Admission::Rejected { retry_after };
        }

        times.push_back(now);
        Admission::Allowed
    }

    /// prunes every window and forgets clients with nothing left in theirs
    pub fn retain_recent(&self) {
        let mut windows = self.windows.lock();
        let now = Instant::now();

        windows.retain(|_, times| {
            prune(times, now, self.window);
            !times.is_empty()
        });
    }

    /// number of clients with requests in their window
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while times.front().is_some_and(|t| now - *t >= window) {
        times.pop_front();
    }
}
