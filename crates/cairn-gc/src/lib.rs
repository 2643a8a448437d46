//! Namespace garbage collection for Cairn.
//!
//! Each namespace has a byte ceiling. When usage exceeds it, the collector
//! evicts the least recently accessed objects until usage is back under the
//! ceiling. A run is `scan -> mark -> select -> delete -> report`.
//!
//! # Design Rules
//!
//! 1. Objects accessed within the grace period are never evicted.
//! 2. Nodes reachable from protected roots are never evicted.
//! 3. A failed delete is logged and counted; it never aborts the run.
//! 4. Cancellation is checked between delete batches.

pub mod collector;
pub mod config;
pub mod error;

pub use collector::{GcReport, NamespaceGarbageCollector};
pub use config::GcConfig;
pub use error::{GcError, GcResult};
