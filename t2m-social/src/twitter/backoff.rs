//! Reconnect delays for the filter stream.
//!
//! Network-level failures back off linearly, HTTP errors exponentially, and rate
//! limiting (420/429) exponentially from a much higher floor. A successful
//! connection resets every schedule.
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub network_step: Duration,
    pub network_max: Duration,
    pub http_initial: Duration,
    pub http_max: Duration,
    pub rate_limited_initial: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            network_step: Duration::from_millis(250),
            network_max: Duration::from_secs(16),
            http_initial: Duration::from_secs(5),
            http_max: Duration::from_secs(320),
            rate_limited_initial: Duration::from_secs(60),
        }
    }
}

/// Why the previous connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Http,
    RateLimited,
}

/// Stateful delay schedule driven by consecutive failures.
///
/// ```
/// use std::time::Duration;
/// use t2m_social::twitter::backoff::{Backoff, Failure, ReconnectPolicy};
///
/// let mut b = Backoff::new(ReconnectPolicy::default());
/// assert_eq!(b.next(Failure::Network), Duration::from_millis(250));
/// assert_eq!(b.next(Failure::Network), Duration::from_millis(500));
/// b.reset();
/// assert_eq!(b.next(Failure::Http), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    network: Duration,
    http: Option<Duration>,
    rate_limited: Option<Duration>,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            network: Duration::ZERO,
            http: None,
            rate_limited: None,
        }
    }

    pub fn next(&mut self, failure: Failure) -> Duration {
        let p = &self.policy;
        match failure {
            Failure::Network => {
                self.network = (self.network + p.network_step).min(p.network_max);
                self.network
            }
            Failure::Http => {
                let d = self
                    .http
                    .map_or(p.http_initial, |prev| (prev * 2).min(p.http_max));
                self.http = Some(d);
                d
            }
            // Capped at eight times the HTTP ceiling.
            Failure::RateLimited => {
                let d = self
                    .rate_limited
                    .map_or(p.rate_limited_initial, |prev| (prev * 2).min(p.http_max * 8));
                self.rate_limited = Some(d);
                d
            }
        }
    }

    pub fn reset(&mut self) {
        self.network = Duration::ZERO;
        self.http = None;
        self.rate_limited = None;
    }
}
