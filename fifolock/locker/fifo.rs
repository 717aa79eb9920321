use std::{future::Future, time::Duration};

use super::extendable::ExtendableLock;
use super::quorum::{Lock, LockErr};
use crate::prelude::*;

const DEFAULT_FIFO_RETRY_COUNT: u32 = 30;
const DEFAULT_FIFO_RETRY_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_FIFO_QUEUE_LENGTH: u32 = 64;
const DEFAULT_FIFO_EPHEMERAL_TTL: Duration = Duration::from_millis(5000);

/// A lock that serves concurrent requesters for the same resource in arrival order.
///
/// Requesters join a chain of positional sub-locks at the tail and walk
/// forward one slot at a time; the head of the chain (position 0) holds the
/// logical lock under the bare resource name. Non-head slots are short-lived
/// placeholders kept alive by the requester walking them, so a crashed
/// waiter drops out of the queue on its own and successors advance.
#[derive(Debug, Clone)]
pub struct FifoLock {
    extendable: ExtendableLock,
    fifo_retry_count: u32,
    fifo_retry_delay: Duration,
    fifo_queue_length: u32,
    fifo_ephemeral_ttl: Duration,
}

/// Physical key of `resource`'s queue slot at `position`.
///
/// Position 0 is the resource name itself, so the head of the chain contends
/// on the same key a plain quorum locker would. This naming is a stable
/// contract: differently configured clients must agree on it.
fn positional_name(resource: &str, position: u32) -> String {
    if position == 0 {
        resource.to_string()
    } else {
        format!("{}__{}", resource, position)
    }
}

impl FifoLock {
    /// Create a locker from one connection descriptor per instance
    /// (like `redis://127.0.0.1:6379`).
    ///
    /// The underlying quorum layer is configured for a single acquisition
    /// round per slot attempt, so a taken slot surfaces to the queue walk
    /// immediately; override with [`set_retry`](Self::set_retry) if needed.
    pub fn new<T: Into<String>>(conn_strs: impl IntoIterator<Item = T>) -> RResult<Self, LockErr> {
        let mut extendable = ExtendableLock::new(conn_strs)?;
        extendable.set_retry(1, DEFAULT_FIFO_RETRY_DELAY);
        Ok(Self {
            extendable,
            fifo_retry_count: DEFAULT_FIFO_RETRY_COUNT,
            fifo_retry_delay: DEFAULT_FIFO_RETRY_DELAY,
            fifo_queue_length: DEFAULT_FIFO_QUEUE_LENGTH,
            fifo_ephemeral_ttl: DEFAULT_FIFO_EPHEMERAL_TTL,
        })
    }

    /// Set retry count and retry delay of the underlying quorum rounds, see
    /// [`QuorumLock::set_retry`](super::QuorumLock::set_retry).
    pub fn set_retry(&mut self, count: u32, delay: Duration) {
        self.extendable.set_retry(count, delay);
    }

    /// Set the clock drift factor, see
    /// [`QuorumLock::set_clock_drift_factor`](super::QuorumLock::set_clock_drift_factor).
    pub fn set_clock_drift_factor(&mut self, factor: f32) {
        self.extendable.set_clock_drift_factor(factor);
    }

    /// Set the stall budget of the queue walk.
    ///
    /// The count bounds *consecutive* failed slot attempts, not total ones: a
    /// walk making forward motion never times out. Budget
    /// `count * delay` against how long queue predecessors are expected to
    /// hold the lock.
    ///
    /// Count defaults to `30`, delay to `200ms`.
    pub fn set_fifo_retry(&mut self, count: u32, delay: Duration) {
        self.fifo_retry_count = count;
        self.fifo_retry_delay = delay;
    }

    /// Set how many waiting slots the queue has behind the head.
    ///
    /// Defaults to `64`.
    pub fn set_fifo_queue_length(&mut self, length: u32) {
        self.fifo_queue_length = length;
    }

    /// Set the ttl of waiting (non-head) slots.
    ///
    /// Short enough that a crashed waiter frees its slot quickly, long
    /// enough that a live one re-extends it comfortably between attempts.
    /// Defaults to `5s`.
    pub fn set_fifo_ephemeral_ttl(&mut self, ttl: Duration) {
        self.fifo_ephemeral_ttl = ttl;
    }

    /// Acquire `resource` for `ttl`, queueing fairly behind earlier callers.
    ///
    /// Joins the positional chain at the tail and advances one slot per
    /// successful acquisition, releasing the previous slot after each
    /// advance. Only the head slot carries the caller's `ttl`. Aborting
    /// (stall budget exhausted) releases any held slot.
    pub async fn lock(&self, resource: &str, ttl: Duration) -> RResult<Lock, LockErr> {
        debug!("Locking resource '{}' with ttl {:?}.", resource, ttl);

        let mut current_position: Option<u32> = None;
        let mut held: Option<Lock> = None;
        let mut retries: u32 = 0;

        while current_position != Some(0) && retries < self.fifo_retry_count {
            let next_position = match current_position {
                // Advance one slot toward the head.
                Some(position) => position - 1,
                // Join the queue at the tail.
                None => self.fifo_queue_length,
            };

            // Keep the currently held slot alive while contending for the next one.
            if let Some(held) = &held {
                self.extendable.extend(held, self.fifo_ephemeral_ttl).await;
            }

            // Waiting slots are short-lived placeholders, only the head
            // carries the caller's ttl.
            let next_ttl = if next_position == 0 {
                ttl
            } else {
                self.fifo_ephemeral_ttl
            };

            debug!(
                "Trying to acquire '{}' position {}, try #{}.",
                resource, next_position, retries
            );
            match self
                .extendable
                .lock(&positional_name(resource, next_position), next_ttl)
                .await
            {
                Ok(next_lock) => {
                    debug!("Resource '{}' position {} acquired.", resource, next_position);
                    // The budget counts stalled attempts, forward motion resets it.
                    retries = 0;
                    if let Some(previous) = held.take() {
                        debug!("Releasing previous slot '{}'.", previous.resource);
                        self.extendable.unlock(&previous).await;
                    }
                    current_position = Some(next_position);
                    held = Some(next_lock);
                }
                Err(_) => {
                    retries += 1;
                    tokio::time::sleep(self.fifo_retry_delay).await;
                }
            }
        }

        match (current_position, held) {
            // positional_name(resource, 0) is the bare resource name, so the
            // returned lock releases/extends/validates against the head key.
            (Some(0), Some(lock)) => Ok(lock),
            (_, held) => {
                debug!(
                    "Could not get lock on '{}' (position 0) after {} stalled tries.",
                    resource, retries
                );
                if let Some(previous) = held {
                    debug!("Releasing previous slot '{}'.", previous.resource);
                    self.extendable.unlock(&previous).await;
                }
                Err(Report::new(LockErr::Unavailable).attach_printable(format!(
                    "Queue for '{}' did not advance within {} stalled attempts.",
                    resource, self.fifo_retry_count
                )))
            }
        }
    }

    /// Release the head lock, see [`QuorumLock::unlock`](super::QuorumLock::unlock).
    pub async fn unlock(&self, lock: &Lock) -> bool {
        self.extendable.unlock(lock).await
    }

    /// Prolong the head lock's ttl, see [`ExtendableLock::extend`].
    pub async fn extend(&self, lock: &Lock, new_ttl: Duration) -> bool {
        self.extendable.extend(lock, new_ttl).await
    }

    /// Whether the head lock is still held by a quorum, see
    /// [`ExtendableLock::is_valid`]. Validates the head key only: a queued
    /// waiter's slot is not the logical lock.
    pub async fn is_valid(&self, lock: &Lock) -> bool {
        self.extendable.is_valid(lock).await
    }

    /// Start background renewal of the head lock, see
    /// [`ExtendableLock::start_autoextend`].
    pub fn start_autoextend(
        &self,
        lock: &Lock,
        every: Duration,
        new_ttl: Duration,
    ) -> RResult<(), LockErr> {
        self.extendable.start_autoextend(lock, every, new_ttl)
    }

    /// Stop background renewal of the head lock, see
    /// [`ExtendableLock::stop_autoextend`].
    pub async fn stop_autoextend(&self, lock: &Lock) {
        self.extendable.stop_autoextend(lock).await;
    }

    /// Scoped auto-extension of the head lock, see
    /// [`ExtendableLock::with_autoextend`].
    pub async fn with_autoextend<T>(
        &self,
        lock: &Lock,
        every: Duration,
        new_ttl: Duration,
        fut: impl Future<Output = T>,
    ) -> RResult<T, LockErr> {
        self.extendable.with_autoextend(lock, every, new_ttl, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_naming_is_stable() {
        assert_eq!("pants", positional_name("pants", 0));
        assert_eq!("pants__1", positional_name("pants", 1));
        assert_eq!("pants__64", positional_name("pants", 64));
        assert_eq!("a__b__3", positional_name("a__b", 3));
    }
}
