use std::time::Duration;

use futures::future::join_all;

use super::autoextend::ExtenderRegistry;
use super::quorum::{Lock, LockErr, QuorumLock};
use super::script::EXTEND_SCRIPT;
use crate::prelude::*;

/// A quorum lock that can also prolong and re-check held locks.
///
/// Clones share the auto-extender registry, so a lock started on one clone
/// can be stopped from another.
#[derive(Debug, Clone)]
pub struct ExtendableLock {
    quorum: QuorumLock,
    pub(crate) extenders: ExtenderRegistry,
}

impl ExtendableLock {
    /// Create a locker from one connection descriptor per instance
    /// (like `redis://127.0.0.1:6379`).
    pub fn new<T: Into<String>>(conn_strs: impl IntoIterator<Item = T>) -> RResult<Self, LockErr> {
        Ok(Self::from_quorum(QuorumLock::new(conn_strs)?))
    }

    pub(crate) fn from_quorum(quorum: QuorumLock) -> Self {
        Self {
            quorum,
            extenders: ExtenderRegistry::default(),
        }
    }

    /// Set retry count and retry delay for acquisition rounds, see [`QuorumLock::set_retry`].
    pub fn set_retry(&mut self, count: u32, delay: Duration) {
        self.quorum.set_retry(count, delay);
    }

    /// Set the clock drift factor, see [`QuorumLock::set_clock_drift_factor`].
    pub fn set_clock_drift_factor(&mut self, factor: f32) {
        self.quorum.set_clock_drift_factor(factor);
    }

    /// Acquire `resource` for `ttl`, see [`QuorumLock::lock`].
    pub async fn lock(&self, resource: &str, ttl: Duration) -> RResult<Lock, LockErr> {
        self.quorum.lock(resource, ttl).await
    }

    /// Release the given lock, see [`QuorumLock::unlock`].
    pub async fn unlock(&self, lock: &Lock) -> bool {
        self.quorum.unlock(lock).await
    }

    /// Prolong the lock's ttl on every instance still holding its token.
    ///
    /// The new ttl replaces the remaining one: extending with 10 seconds
    /// means the entry now lives 10 seconds, not the prior remaining plus 10.
    /// Returns true iff a quorum accepted the extension.
    ///
    /// A partial extension is left in place rather than rolled back: a
    /// minority of prolonged entries cannot grant anyone else the lock and
    /// expires on its own. The CAS guard means a stale extender can never
    /// refresh an entry that has since been re-acquired by another client.
    /// A ttl that cannot be expressed in milliseconds fails the extension.
    pub async fn extend(&self, lock: &Lock, new_ttl: Duration) -> bool {
        let Ok(new_ttl_ms) = u64::try_from(new_ttl.as_millis()) else {
            return false;
        };
        let n = join_all(self.quorum.instances().iter().map(|instance| {
            instance.run_script(&EXTEND_SCRIPT, &lock.resource, &lock.key, Some(new_ttl_ms))
        }))
        .await
        .into_iter()
        .filter(|extended| *extended)
        .count();
        n >= self.quorum.quorum()
    }

    /// Whether the lock is still held by a quorum of instances.
    ///
    /// Read-only: counts the instances whose entry still carries this lock's token.
    pub async fn is_valid(&self, lock: &Lock) -> bool {
        let n = join_all(
            self.quorum
                .instances()
                .iter()
                .map(|instance| instance.holder(&lock.resource)),
        )
        .await
        .into_iter()
        .filter(|holder| holder.as_deref() == Some(lock.key.as_slice()))
        .count();
        n >= self.quorum.quorum()
    }
}
