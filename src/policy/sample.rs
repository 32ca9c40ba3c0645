//! Message sampling strategies.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;

use crate::entry::{FieldValue, Fields};

/// How messages are sampled before enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingStrategy {
    /// Pass everything.
    None,
    /// Pass with probability `rate`.
    Random,
    /// Pass every Nth message, N derived from `rate` (N = round(1/rate)).
    Interval,
    /// Deterministic: hash the key (default the message) against `rate`.
    Consistent,
}

pub(crate) struct Sampler {
    strategy: SamplingStrategy,
    rate: f64,
    /// Interval strategy: pass one in `every`.
    every: u64,
    counter: AtomicU64,
    /// Consistent strategy: hashes below this pass.
    threshold: u64,
    key_field: Option<String>,
    hasher: RandomState,
}

impl Sampler {
    pub(crate) fn new(strategy: SamplingStrategy, rate: f64, key_field: Option<String>) -> Sampler {
        let rate = rate.clamp(0.0, 1.0);
        let every = if rate <= 0.0 {
            u64::MAX
        } else {
            (1.0 / rate).round().max(1.0) as u64
        };
        let threshold = if rate >= 1.0 {
            u64::MAX
        } else {
            (rate * u64::MAX as f64) as u64
        };
        Sampler {
            strategy,
            rate,
            every,
            counter: AtomicU64::new(0),
            threshold,
            key_field,
            // Fixed seeds: the same key must sample the same way across
            // logger instances.
            hasher: RandomState::with_seeds(7, 11, 13, 17),
        }
    }

    #[cfg(test)]
    pub(crate) fn passthrough() -> Sampler {
        Sampler::new(SamplingStrategy::None, 1.0, None)
    }

    pub(crate) fn accept(&self, message: &str, fields: Option<&Fields>) -> bool {
        match self.strategy {
            SamplingStrategy::None => true,
            SamplingStrategy::Random => {
                if self.rate >= 1.0 {
                    true
                } else if self.rate <= 0.0 {
                    false
                } else {
                    rand::random::<f64>() < self.rate
                }
            }
            SamplingStrategy::Interval => {
                if self.rate <= 0.0 {
                    return false;
                }
                self.counter.fetch_add(1, Ordering::Relaxed) % self.every == 0
            }
            SamplingStrategy::Consistent => {
                if self.rate >= 1.0 {
                    return true;
                }
                if self.rate <= 0.0 {
                    return false;
                }
                let mut hasher = self.hasher.build_hasher();
                self.key(message, fields).hash(&mut hasher);
                hasher.finish() < self.threshold
            }
        }
    }

    fn key<'a>(&self, message: &'a str, fields: Option<&'a Fields>) -> &'a str {
        if let (Some(field), Some(fields)) = (&self.key_field, fields) {
            if let Some(FieldValue::Str(s)) = fields.get(field.as_str()) {
                return s;
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_passes_everything() {
        let s = Sampler::passthrough();
        for i in 0..100 {
            assert!(s.accept(&format!("m{i}"), None));
        }
    }

    #[test]
    fn test_rate_zero_drops_all() {
        for strategy in [
            SamplingStrategy::Random,
            SamplingStrategy::Interval,
            SamplingStrategy::Consistent,
        ] {
            let s = Sampler::new(strategy, 0.0, None);
            for i in 0..50 {
                assert!(!s.accept(&format!("m{i}"), None), "{:?}", strategy);
            }
        }
    }

    #[test]
    fn test_rate_one_passes_all() {
        for strategy in [
            SamplingStrategy::Random,
            SamplingStrategy::Interval,
            SamplingStrategy::Consistent,
        ] {
            let s = Sampler::new(strategy, 1.0, None);
            for i in 0..50 {
                assert!(s.accept(&format!("m{i}"), None), "{:?}", strategy);
            }
        }
    }

    #[test]
    fn test_interval_every_nth() {
        let s = Sampler::new(SamplingStrategy::Interval, 0.25, None);
        let passed = (0..100).filter(|_| s.accept("m", None)).count();
        assert_eq!(passed, 25);
    }

    #[test]
    fn test_consistent_is_deterministic() {
        let a = Sampler::new(SamplingStrategy::Consistent, 0.5, None);
        let b = Sampler::new(SamplingStrategy::Consistent, 0.5, None);
        for i in 0..200 {
            let msg = format!("message-{i}");
            assert_eq!(a.accept(&msg, None), b.accept(&msg, None));
        }
    }

    #[test]
    fn test_consistent_key_field_override() {
        let s = Sampler::new(
            SamplingStrategy::Consistent,
            0.5,
            Some("request_id".to_string()),
        );
        let mut fields = Fields::new();
        fields.insert("request_id".into(), "req-42".into());
        // Same key, different message: the decision must match.
        let first = s.accept("first message", Some(&fields));
        let second = s.accept("second message", Some(&fields));
        assert_eq!(first, second);
    }

    #[test]
    fn test_random_rate_roughly_honoured() {
        let s = Sampler::new(SamplingStrategy::Random, 0.5, None);
        let passed = (0..10_000).filter(|_| s.accept("m", None)).count();
        // Loose bounds; this is a sanity check, not a statistics exam.
        assert!(passed > 3_500 && passed < 6_500, "passed {passed}");
    }
}
