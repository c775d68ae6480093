use std::time::{Duration, Instant};

/// Fixed time-to-live measured from an entry's last fetch or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl TtlPolicy {
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// An entry exactly `ttl` old is still fresh.
    #[inline]
    pub fn is_expired(&self, touched: Instant, now: Instant) -> bool {
        now.saturating_duration_since(touched) > self.ttl
    }

    #[inline]
    pub fn expires_at(&self, touched: Instant) -> Instant {
        touched + self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_fresh() {
        let p = TtlPolicy::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(!p.is_expired(t0, t0));
        assert!(!p.is_expired(t0, t0 + Duration::from_secs(5)));
        assert!(p.is_expired(t0, t0 + Duration::from_millis(5001)));
        // A clock reading older than the touch never counts as expired.
        assert!(!p.is_expired(t0 + Duration::from_secs(1), t0));
        assert_eq!(p.expires_at(t0), t0 + Duration::from_secs(5));
    }
}
