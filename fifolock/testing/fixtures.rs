use tracing::Level;

use crate::testing::prelude::*;

/// Include this in a test to turn on logging globally.
#[fixture]
#[once]
pub fn logging(#[default(Level::DEBUG)] level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .init();
}
