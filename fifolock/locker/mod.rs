mod autoextend;
mod extendable;
mod fifo;
mod instance;
mod quorum;
mod script;

mod standalone_redis;

pub use standalone_redis::*;

pub use extendable::ExtendableLock;
pub use fifo::FifoLock;
pub use instance::Instance;
pub use quorum::{Lock, LockErr, QuorumLock};
// Re-exporting redis and deadpool_redis to be used outside if needed:
pub use deadpool_redis;
pub use redis;
