//! Rendering primitives shared by the charts: a mutable document overlay,
//! path geometry, spring animation and label formatting.

pub mod document;
pub mod format;
pub mod path;
pub mod spring;

pub use document::{ChartDocument, NodeHandle};
pub use spring::{Spring, SpringConfig};
