//! Service layer: computations the charts delegate to outside the timeline.
//!
//! Services run off the notification path. The session dispatches requests
//! to them as tokio tasks and feeds the results back to the charts.

pub mod meta;

pub use meta::{Aggregator, RandomEffects};
