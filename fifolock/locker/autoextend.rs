use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};

use super::extendable::ExtendableLock;
use super::quorum::{Lock, LockErr};
use crate::log::record_exception;
use crate::prelude::*;

/// Per-locker table of running extenders, keyed by the lock identity
/// (resource, token). Shared between clones of the locker.
#[derive(Debug, Default, Clone)]
pub(crate) struct ExtenderRegistry {
    inner: Arc<Mutex<HashMap<(String, Vec<u8>), Extender>>>,
}

#[derive(Debug)]
struct Extender {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExtendableLock {
    /// Start a background task renewing `lock` to `new_ttl` every `every`.
    ///
    /// The first renewal happens immediately, the task then sleeps `every`
    /// between rounds. Renewal is best effort: a failed round is not
    /// reported, the entry just expires naturally and the holder observes
    /// that via [`is_valid`](Self::is_valid). There is no guarantee a renewal
    /// lands before the entry expires, so pick `every` well below
    /// `new_ttl / 2`.
    ///
    /// Errors with [`LockErr::AlreadyExtending`] if an extender is already
    /// running for this lock.
    pub fn start_autoextend(
        &self,
        lock: &Lock,
        every: Duration,
        new_ttl: Duration,
    ) -> RResult<(), LockErr> {
        let mut extenders = self.extenders.inner.lock();
        let identity = (lock.resource.clone(), lock.key.clone());
        if extenders.contains_key(&identity) {
            return Err(Report::new(LockErr::AlreadyExtending).attach_printable(format!(
                "An auto-extender is already running for '{}'.",
                lock.resource
            )));
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let locker = self.clone();
        let lock = lock.clone();
        let task = tokio::spawn(async move {
            loop {
                if !locker.extend(&lock, new_ttl).await {
                    warn!(
                        "Auto-extender could not renew '{}' on a quorum.",
                        lock.resource
                    );
                }
                // The stop signal is checked between rounds, an in-flight
                // renewal above completes naturally.
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(every) => {}
                }
            }
        });

        extenders.insert(identity, Extender { stop: stop_tx, task });
        Ok(())
    }

    /// Stop the running auto-extender for `lock` and wait for it to finish.
    ///
    /// Once this returns no further renewals run and the lock may expire
    /// naturally. A lock with no running extender is a no-op.
    pub async fn stop_autoextend(&self, lock: &Lock) {
        let identity = (lock.resource.clone(), lock.key.clone());
        let extender = self.extenders.inner.lock().remove(&identity);
        let Some(extender) = extender else {
            debug!("No auto-extender running for '{}'.", lock.resource);
            return;
        };

        let _ = extender.stop.send(true);
        if let Err(e) = extender.task.await {
            record_exception("Auto-extender task failed.", format!("{:?}", e));
        }
    }

    /// Scoped auto-extension: starts the extender, runs `fut`, and always
    /// stops the extender before handing back the future's output.
    ///
    /// Cleanup runs exactly once per start, on every exit path: if `fut`
    /// panics or the scope is cancelled mid-await, a guard still deregisters
    /// and signals the extender so it cannot keep renewing the lock.
    pub async fn with_autoextend<T>(
        &self,
        lock: &Lock,
        every: Duration,
        new_ttl: Duration,
        fut: impl Future<Output = T>,
    ) -> RResult<T, LockErr> {
        self.start_autoextend(lock, every, new_ttl)?;
        let stop_guard = StopOnDrop {
            locker: self,
            identity: (lock.resource.clone(), lock.key.clone()),
        };
        let output = fut.await;
        self.stop_autoextend(lock).await;
        // Already stopped and joined, the guard finds nothing to do.
        drop(stop_guard);
        Ok(output)
    }
}

/// Backstop for a panicking or cancelled scoped section: deregisters the
/// extender and signals it to stop if it is still registered. The task cannot
/// be joined from a destructor, it winds down on its own after the signal.
struct StopOnDrop<'a> {
    locker: &'a ExtendableLock,
    identity: (String, Vec<u8>),
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(extender) = self
            .locker
            .extenders
            .inner
            .lock()
            .remove(&self.identity)
        {
            let _ = extender.stop.send(true);
        }
    }
}
