use std::time::Duration;

use deadpool_redis::{Config, Runtime};
use redis::Value;

use super::quorum::LockErr;
use super::script::LockScript;
use crate::log::record_exception;
use crate::prelude::*;

/// A single replica of the instance set.
///
/// Failures talking to the replica are never surfaced: every operation folds
/// them into its zero-success outcome, so an unreachable replica simply
/// cannot contribute to a quorum.
#[derive(Clone)]
pub struct Instance {
    pool: deadpool_redis::Pool,
    conn_str: String,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("conn_str", &self.conn_str)
            .finish()
    }
}

impl Instance {
    /// Create a client for one replica from its connection descriptor
    /// (like `redis://127.0.0.1:6379`).
    pub fn new(conn_str: impl Into<String>) -> RResult<Self, LockErr> {
        let conn_str = conn_str.into();
        let cfg = Config::from_url(&conn_str);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .change_context(LockErr::BadConfig)
            .attach_printable_lazy(|| format!("Invalid instance descriptor: '{}'.", conn_str))?;
        Ok(Self { pool, conn_str })
    }

    /// Get a pooled connection, `None` when the replica is unreachable.
    async fn conn(&self) -> Option<deadpool_redis::Connection> {
        match self.pool.get().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                record_exception(
                    format!("Failed to get connection to instance '{}'.", self.conn_str),
                    format!("{:?}", e),
                );
                None
            }
        }
    }

    /// Access the underlying pool, e.g. for startup probes that shouldn't log failures.
    pub(crate) fn inner_pool(&self) -> &deadpool_redis::Pool {
        &self.pool
    }

    /// `SET resource key NX PX ttl`: create the lock entry only if absent.
    pub(crate) async fn try_acquire(&self, resource: &str, key: &[u8], ttl: Duration) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        let result = redis::cmd("SET")
            .arg(resource)
            .arg(key)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<Value>(&mut conn)
            .await;
        matches!(result, Ok(Value::Okay))
    }

    /// Read the token currently holding `resource` on this replica.
    pub(crate) async fn holder(&self, resource: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn().await?;
        redis::cmd("GET")
            .arg(resource)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .unwrap_or(None)
    }

    /// Run one of the protocol scripts against this replica.
    ///
    /// True iff the script returned a nonzero integer (`pexpire` returns 1,
    /// `del` the number of removed keys).
    pub(crate) async fn run_script(
        &self,
        script: &LockScript,
        resource: &str,
        key: &[u8],
        extra_arg: Option<u64>,
    ) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        match script
            .invocation(resource, key, extra_arg)
            .invoke_async::<i64>(&mut conn)
            .await
        {
            Ok(result) => result != 0,
            Err(_) => false,
        }
    }

    /// Ping the replica, returning true if it's up.
    pub async fn ping(&self) -> bool {
        if let Some(mut conn) = self.conn().await {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok()
        } else {
            false
        }
    }
}
