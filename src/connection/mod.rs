//! Per-connection protocol handling.
//!
//! A connection owns one [`BlockSource`](crate::source::BlockSource), folds
//! its blocks into snapshots with a [`SnapshotBuilder`], and reports
//! everything it produces to a [`ConnectionObserver`] tagged with the
//! connection's index. Indices are handed out by the client and never reused.

mod builder;
mod driver;

#[cfg(test)]
mod tests;

pub use builder::{Delivery, SnapshotBuilder};
pub use driver::{ConnectionContext, ConnectionDriver, TcpSettings, connect_tcp};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::objects::{DynamicObjects, ObjectKind, StaticObjects};

/// Receives connection events.
///
/// Called from I/O tasks; implementations must not block for long.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_connected(&self, index: usize);

    /// The server listed the kinds it can produce.
    fn on_capabilities(&self, index: usize, kinds: BTreeSet<ObjectKind>);

    fn on_static_objects(&self, index: usize, statics: Arc<StaticObjects>);

    fn on_dynamic_objects(&self, index: usize, dynamics: Arc<DynamicObjects>);

    /// The connection is gone. Called exactly once per started connection,
    /// including when the connection attempt itself failed.
    fn on_disconnected(&self, index: usize);
}
