use std::time::Duration;

use tokio::time::Instant;

use pairpad_core::error::ClientCode;

use crate::config::RateLimits;

/// Decision from policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Pass,
    Drop,
    Close { code: ClientCode, msg: &'static str },
}

impl PolicyDecision {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyDecision::Pass => "pass",
            PolicyDecision::Drop => "drop",
            PolicyDecision::Close { .. } => "close",
        }
    }
}

/// Per-connection policy. Owned by the connection task, so no locking.
#[derive(Debug)]
pub struct InboundPolicy {
    max_frame_bytes: usize,
    bucket: TokenBucket,
}

impl InboundPolicy {
    pub fn new(max_frame_bytes: usize, limits: &RateLimits) -> Self {
        Self {
            max_frame_bytes,
            bucket: TokenBucket::new(limits.rps, limits.burst),
        }
    }

    /// Oversized frames close the connection; frames over the rate are dropped.
    pub fn check(&mut self, bytes_len: usize) -> PolicyDecision {
        if bytes_len > self.max_frame_bytes {
            return PolicyDecision::Close {
                code: ClientCode::PayloadTooLarge,
                msg: "frame too large",
            };
        }
        if !self.bucket.allow() {
            return PolicyDecision::Drop;
        }
        PolicyDecision::Pass
    }
}

#[derive(Debug)]
struct TokenBucket {
    rps: u32,
    capacity: u32,
    tokens: u32,
    last: Instant,
}

impl TokenBucket {
    fn new(rps: u32, burst: u32) -> Self {
        let capacity = burst.max(1);
        Self {
            rps: rps.max(1),
            capacity,
            tokens: capacity,
            last: Instant::now(),
        }
    }

    fn allow(&mut self) -> bool {
        self.refill();
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        if elapsed < Duration::from_millis(50) {
            return;
        }
        let add = (elapsed.as_millis() as u64 * self.rps as u64 / 1000) as u32;
        if add > 0 {
            self.tokens = self.tokens.saturating_add(add).min(self.capacity);
            self.last = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_frame_closes() {
        let mut p = InboundPolicy::new(1024, &RateLimits::default());
        assert_eq!(p.check(1024), PolicyDecision::Pass);
        assert!(matches!(p.check(1025), PolicyDecision::Close { code: ClientCode::PayloadTooLarge, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let mut p = InboundPolicy::new(1024, &RateLimits { rps: 10, burst: 2 });
        assert_eq!(p.check(1), PolicyDecision::Pass);
        assert_eq!(p.check(1), PolicyDecision::Pass);
        assert_eq!(p.check(1), PolicyDecision::Drop);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(p.check(1), PolicyDecision::Pass);
    }
}
