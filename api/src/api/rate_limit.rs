use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Mutex,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{
    response::{ResponseCode, ResponseWrapper},
    ApiContext,
};

/// Fixed-window per-IP rate limiter applied in front of the request gate.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, WindowState>>,
}

struct WindowState {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, ip: IpAddr) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        // a lapsed window carries no state worth keeping; evicting here
        // bounds the map by the IPs seen within one window
        hits.retain(|_, state| now.duration_since(state.started) < self.window);

        let state = hits.entry(ip).or_insert(WindowState {
            started: now,
            count: 0,
        });

        if state.count >= self.limit {
            false
        } else {
            state.count += 1;
            true
        }
    }

    #[cfg(test)]
    fn tracked_ips(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub async fn rate_limit(
    State(ctx): State<ApiContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !ctx.rate_limiter.try_acquire(addr.ip()) {
        return ResponseWrapper::<()> {
            code: ResponseCode::TooManyRequests,
            message: "Too many requests, please try again later.".to_string(),
            data: None,
        }
        .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn enforces_limit_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire(ip(1)));
        assert!(limiter.try_acquire(ip(1)));
        assert!(!limiter.try_acquire(ip(1)));
    }

    #[test]
    fn counts_per_ip_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire(ip(1)));
        assert!(limiter.try_acquire(ip(2)));
        assert!(!limiter.try_acquire(ip(1)));
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(0));
        assert!(limiter.try_acquire(ip(1)));
        // zero-length window: every call starts a fresh one
        assert!(limiter.try_acquire(ip(1)));
    }

    #[test]
    fn lapsed_entries_are_evicted() {
        let limiter = RateLimiter::new(1, Duration::from_millis(0));
        assert!(limiter.try_acquire(ip(1)));
        assert_eq!(limiter.tracked_ips(), 1);
        // ip 1's window has lapsed by the time ip 2 arrives, so its entry
        // is dropped rather than kept forever
        assert!(limiter.try_acquire(ip(2)));
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn live_entries_survive_eviction() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        assert!(limiter.try_acquire(ip(1)));
        assert!(limiter.try_acquire(ip(2)));
        assert_eq!(limiter.tracked_ips(), 2);
    }
}
