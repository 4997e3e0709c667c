//! Query engine: uniform document service for handlers and the
//! realtime/trigger subsystems, layered over the routed store backend.

pub mod engine;
pub mod replication;
pub mod router;
pub mod transaction;

mod prelude;

pub use engine::Engine;
pub use router::{RoutedStore, SingleRouter, SplitRouter};
pub use transaction::WriteOp;

// vim: ts=4
