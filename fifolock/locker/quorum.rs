use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::RngCore;

use super::instance::Instance;
use super::script::UNLOCK_SCRIPT;
use crate::prelude::*;

const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_CLOCK_DRIFT_FACTOR: f32 = 0.01;

/// Errors surfaced by the lock stack.
#[derive(Debug)]
pub enum LockErr {
    /// An instance connection descriptor was malformed, or a caller-supplied
    /// duration cannot be expressed in milliseconds.
    BadConfig,
    /// The lock could not be acquired within the retry budget.
    Unavailable,
    /// `start_autoextend` was called for a lock that already has a running extender.
    AlreadyExtending,
}

impl std::fmt::Display for LockErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockErr::BadConfig => write!(f, "Bad instance configuration"),
            LockErr::Unavailable => write!(f, "Lock unavailable"),
            LockErr::AlreadyExtending => {
                write!(f, "Lock already has a running auto-extender")
            }
        }
    }
}

impl error_stack::Context for LockErr {}

/// A successfully acquired lock.
///
/// The value is immutable: extending the lock on the instance set does not
/// update `validity`, callers needing fresh validity re-check with
/// [`ExtendableLock::is_valid`](super::ExtendableLock::is_valid).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// The locked resource, used as the entry key on every instance.
    pub resource: String,
    /// The random token minted for this acquisition, proves ownership.
    pub key: Vec<u8>,
    /// Estimated remaining time the lock is guaranteed held on a quorum.
    /// Should only be slightly smaller than the requested TTL.
    pub validity: Duration,
}

/// The classic quorum lock over N independent instances.
///
/// An acquisition holds iff at least ⌊N/2⌋+1 instances accepted the entry and
/// the time spent acquiring left a positive validity window. This layer alone
/// provides no fairness: simultaneous acquirers race per retry round.
#[derive(Debug, Clone)]
pub struct QuorumLock {
    instances: Vec<Instance>,
    quorum: usize,
    retry_count: u32,
    retry_delay: Duration,
    clock_drift_factor: f32,
}

impl QuorumLock {
    /// Create a locker from one connection descriptor per instance
    /// (like `redis://127.0.0.1:6379`).
    pub fn new<T: Into<String>>(conn_strs: impl IntoIterator<Item = T>) -> RResult<Self, LockErr> {
        let instances = conn_strs
            .into_iter()
            .map(Instance::new)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok(Self::from_instances(instances))
    }

    pub(crate) fn from_instances(instances: Vec<Instance>) -> Self {
        // Quorum is defined to be N/2+1, with N being the number of instances.
        let quorum = instances.len() / 2 + 1;
        Self {
            instances,
            quorum,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            clock_drift_factor: DEFAULT_CLOCK_DRIFT_FACTOR,
        }
    }

    /// Set retry count and retry delay for acquisition rounds.
    ///
    /// Retry count defaults to `3`.
    /// Retry delay defaults to `200ms`.
    pub fn set_retry(&mut self, count: u32, delay: Duration) {
        self.retry_count = count;
        self.retry_delay = delay;
    }

    /// Set the clock drift factor used in the validity calculation.
    ///
    /// Defaults to `0.01`.
    pub fn set_clock_drift_factor(&mut self, factor: f32) {
        self.clock_drift_factor = factor;
    }

    pub(crate) fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub(crate) fn quorum(&self) -> usize {
        self.quorum
    }

    /// Get 20 random bytes from the pseudorandom interface.
    pub(crate) fn mint_key() -> Vec<u8> {
        let mut buf = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut buf);
        buf.to_vec()
    }

    /// Drift budget subtracted from the validity window. The extra 2ms covers
    /// the store's 1ms expiry precision plus 1ms minimum drift for small TTLs.
    pub(crate) fn drift_ms(&self, ttl_ms: u64) -> u64 {
        (ttl_ms as f64 * self.clock_drift_factor as f64) as u64 + 2
    }

    /// Acquire `resource` for `ttl`.
    ///
    /// Instance failures don't abort the round, they just can't count toward
    /// the quorum. A round that misses the quorum (or eats through the
    /// validity window) is rolled back on every instance before the next try.
    pub async fn lock(&self, resource: &str, ttl: Duration) -> RResult<Lock, LockErr> {
        let key = Self::mint_key();
        let ttl_ms = u64::try_from(ttl.as_millis())
            .change_context(LockErr::BadConfig)
            .attach_printable("Requested ttl cannot be expressed in milliseconds.")?;

        for attempt in 0..self.retry_count {
            debug!("Trying to acquire '{}', try #{}.", resource, attempt);
            let start = Instant::now();
            let n = join_all(
                self.instances
                    .iter()
                    .map(|instance| instance.try_acquire(resource, &key, ttl)),
            )
            .await
            .into_iter()
            .filter(|acquired| *acquired)
            .count();

            let elapsed_ms = start.elapsed().as_millis() as u64;
            let validity_ms = ttl_ms
                .saturating_sub(elapsed_ms)
                .saturating_sub(self.drift_ms(ttl_ms));

            if n >= self.quorum && validity_ms > 0 {
                return Ok(Lock {
                    resource: resource.to_string(),
                    key,
                    validity: Duration::from_millis(validity_ms),
                });
            }

            // Majority missed or the window closed, roll the partial acquisition back.
            self.unlock_everywhere(resource, &key).await;
            tokio::time::sleep(self.retry_delay).await;
        }

        Err(Report::new(LockErr::Unavailable).attach_printable(format!(
            "Could not acquire '{}' within {} attempts.",
            resource, self.retry_count
        )))
    }

    /// Release the given lock.
    ///
    /// Best effort: each instance drops the entry only while it still holds
    /// this lock's token, unreachable instances are skipped. No quorum check.
    /// Returns whether every instance confirmed the release.
    pub async fn unlock(&self, lock: &Lock) -> bool {
        self.unlock_everywhere(&lock.resource, &lock.key).await
    }

    pub(crate) async fn unlock_everywhere(&self, resource: &str, key: &[u8]) -> bool {
        join_all(
            self.instances
                .iter()
                .map(|instance| instance.run_script(&UNLOCK_SCRIPT, resource, key, None)),
        )
        .await
        .into_iter()
        .all(|released| released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_key_length_and_uniqueness() {
        let key1 = QuorumLock::mint_key();
        let key2 = QuorumLock::mint_key();
        assert_eq!(20, key1.len());
        assert_eq!(20, key2.len());
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_quorum_is_majority() {
        for (n, expected) in [(0, 1), (1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (100, 51)] {
            let instances = (0..n)
                .map(|i| Instance::new(format!("redis://localhost:{}", 7000 + i)))
                .collect::<core::result::Result<Vec<_>, _>>()
                .unwrap();
            assert_eq!(expected, QuorumLock::from_instances(instances).quorum());
        }
    }

    #[test]
    fn test_drift_budget() {
        let locker = QuorumLock::from_instances(vec![]);
        // floor(ttl * 0.01) + 2
        assert_eq!(12, locker.drift_ms(1000));
        assert_eq!(2, locker.drift_ms(10));
        assert_eq!(102, locker.drift_ms(10_000));
    }
}
