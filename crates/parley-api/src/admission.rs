//! Admission control.
//!
//! Message sends are gated synchronously, keyed by the authenticated sender,
//! before they touch the store; reads are never gated. Register and login are
//! gated per client address.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use parley_types::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Throttled { retry_after: Duration },
}

pub trait AdmissionGate<K = UserId>: Send + Sync {
    fn admit(&self, key: K) -> Admission;
}

/// Gate that lets everything through.
pub struct Unlimited;

impl<K> AdmissionGate<K> for Unlimited {
    fn admit(&self, _key: K) -> Admission {
        Admission::Allowed
    }
}

/// The gates the API consults: sends per user, register and login per client address.
#[derive(Clone)]
pub struct Throttles {
    pub send: Arc<dyn AdmissionGate>,
    pub register: Arc<dyn AdmissionGate<IpAddr>>,
    pub login: Arc<dyn AdmissionGate<IpAddr>>,
}

impl Throttles {
    pub fn unlimited() -> Self {
        Self {
            send: Arc::new(Unlimited),
            register: Arc::new(Unlimited),
            login: Arc::new(Unlimited),
        }
    }
}

/// `<requests>/<period>`, e.g. `20/min`. Only the first letter of the period
/// is significant: s, m, h or d.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub requests: u32,
    pub period: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid rate '{0}', expected <requests>/<s|m|h|d>")]
pub struct InvalidRate(String);

impl FromStr for Rate {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRate(s.to_string());

        let (count, period) = s.trim().split_once('/').ok_or_else(invalid)?;
        let requests: u32 = count.trim().parse().map_err(|_| invalid())?;
        if requests == 0 {
            return Err(invalid());
        }

        let secs = match period.trim().chars().next() {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3_600,
            Some('d') => 86_400,
            _ => return Err(invalid()),
        };

        Ok(Rate {
            requests,
            period: Duration::from_secs(secs),
        })
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.requests, self.period.as_secs())
    }
}

/// Admitted calls between sweeps of idle keys.
const SWEEP_INTERVAL: usize = 1024;

/// Per-key sliding window: remembers the instants of admitted calls and
/// refuses a call when `rate.requests` of them fall inside the trailing
/// `rate.period`. Refused calls are not recorded.
pub struct SlidingWindowLimiter<K = UserId> {
    rate: Rate,
    history: Mutex<History<K>>,
}

struct History<K> {
    calls: HashMap<K, VecDeque<Instant>>,
    since_sweep: usize,
}

impl<K: Eq + Hash> SlidingWindowLimiter<K> {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            history: Mutex::new(History {
                calls: HashMap::new(),
                since_sweep: 0,
            }),
        }
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, History<K>> {
        // A poisoned lock only means another caller panicked mid-update; the
        // timestamps themselves are still usable.
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forget every key whose newest admitted call has left the window.
    fn sweep(&self, now: Instant) {
        let period = self.rate.period;
        let mut history = self.lock();
        history
            .calls
            .retain(|_, calls| calls.back().is_some_and(|&last| now.duration_since(last) < period));
        history.since_sweep = 0;
    }

    fn admit_at(&self, key: K, now: Instant) -> Admission {
        let mut history = self.lock();
        let calls = history.calls.entry(key).or_default();

        while let Some(&oldest) = calls.front() {
            if now.duration_since(oldest) >= self.rate.period {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.rate.requests as usize {
            let oldest = calls.front().copied().unwrap_or(now);
            let retry_after = self.rate.period.saturating_sub(now.duration_since(oldest));
            return Admission::Throttled { retry_after };
        }

        calls.push_back(now);
        history.since_sweep += 1;
        let due = history.since_sweep >= SWEEP_INTERVAL;
        drop(history);

        if due {
            self.sweep(now);
        }
        Admission::Allowed
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.lock().calls.len()
    }
}

impl<K: Eq + Hash + Send> AdmissionGate<K> for SlidingWindowLimiter<K> {
    fn admit(&self, key: K) -> Admission {
        self.admit_at(key, Instant::now())
    }
}
