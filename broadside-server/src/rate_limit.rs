//! Token-bucket rate limiting.

use std::time::Instant;

/// Result of asking the bucket for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over budget; carries the number of consecutive drops so far.
    Dropped { consecutive: u32 },
}

/// A token bucket refilled continuously at `rate` tokens per second.
///
/// Capacity equals the rate (at least one token), so a quiet client may
/// burst up to one second's worth of messages.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    consecutive_drops: u32,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(rate: f64, now: Instant) -> Self {
        let capacity = rate.max(1.0);
        Self {
            rate,
            capacity,
            tokens: capacity,
            last_refill: now,
            consecutive_drops: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token if one is available.
    pub fn try_acquire(&mut self, now: Instant) -> RateDecision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.consecutive_drops = 0;
            RateDecision::Allowed
        } else {
            self.consecutive_drops = self.consecutive_drops.saturating_add(1);
            RateDecision::Dropped {
                consecutive: self.consecutive_drops,
            }
        }
    }

    /// Tokens currently available, rounded down.
    pub fn available(&self) -> u32 {
        self.tokens as u32
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
