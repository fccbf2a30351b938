use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_SEND_LIMIT: usize = 12;
pub const DEFAULT_SEND_WINDOW: Duration = Duration::from_secs(60);

/// Once this many addresses are tracked, idle ones are dropped, at most once
/// per window.
const EVICT_THRESHOLD: usize = 4096;

/// Sliding-window throttle keyed by client address.
///
/// Each address keeps the instants of its accepted requests inside the
/// window, never more than `max` of them. Process-local; a restart clears it.
pub struct AbuseGuard {
    max: usize,
    window: Duration,
    inner: Mutex<GuardState>,
}

#[derive(Default)]
struct GuardState {
    hits: HashMap<IpAddr, VecDeque<Instant>>,
    last_evict: Option<Instant>,
}

impl AbuseGuard {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            inner: Mutex::new(GuardState::default()),
        }
    }

    /// Record a request from `addr` and report whether it may proceed.
    pub fn allow(&self, addr: IpAddr) -> bool {
        self.allow_at(addr, Instant::now())
    }

    fn allow_at(&self, addr: IpAddr, now: Instant) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;

        let evict_due = state
            .last_evict
            .is_none_or(|last| now.duration_since(last) >= window);
        if state.hits.len() >= EVICT_THRESHOLD && evict_due {
            state
                .hits
                .retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < window));
            state.last_evict = Some(now);
        }

        let queue = state.hits.entry(addr).or_default();
        while queue
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            queue.pop_front();
        }

        if queue.len() >= self.max {
            return false;
        }
        queue.push_back(now);
        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap().hits.len()
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_LIMIT, DEFAULT_SEND_WINDOW)
    }
}

/// Reject over-limit senders before the body is read.
pub async fn limit_sends(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.guard.allow(addr.ip()) {
        debug!("Rate limited send from {}", addr.ip());
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}
