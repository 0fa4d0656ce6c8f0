//! per-ip sliding-window rate limiter
//!
//! one timestamp deque per source ip. a request is admitted when fewer
//! than `max_per_window` admitted timestamps fall inside the trailing
//! window. compaction drops ips that have gone quiet so the table stays
//! bounded by active peers, not history.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self { max_per_window, window, hits: Mutex::new(HashMap::new()) }
    }

    /// admit or reject a request from `ip` at time `now`
    pub fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap();
        let deque = hits.entry(ip).or_default();
        while let Some(front) = deque.front() {
            if now.duration_since(*front) >= self.window {
                deque.pop_front();
            } else {
                break;
            }
        }
        if deque.len() >= self.max_per_window {
            return false;
        }
        deque.push_back(now);
        true
    }

    pub fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now())
    }

    /// drop ips whose entire history has aged out
    pub fn compact(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        hits.retain(|_, deque| {
            while let Some(front) = deque.front() {
                if now.duration_since(*front) >= self.window {
                    deque.pop_front();
                } else {
                    break;
                }
            }
            !deque.is_empty()
        });
    }

    pub fn tracked_ips(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}
