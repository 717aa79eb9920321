#![allow(clippy::module_inception)]
#![warn(clippy::disallowed_types)]
#![warn(missing_docs)]

//! fifolock - A fair (FIFO-ordered), fault-tolerant, extendable distributed lock over independent Redis instances.

// When docs auto created for docs.rs, will include features, given docs.rs uses nightly by default:
#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]

mod prelude;

/// Error handling utilities.
pub mod errors;
/// The lock stack: quorum primitive, extension, auto-renewal, FIFO queueing.
pub mod locker;
/// Logging utilities.
pub mod log;

#[cfg(test)]
mod testing;
