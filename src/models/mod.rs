//! Domain models shared by the repository, the timeline and the charts.

mod effect;
mod study;

pub use effect::{AggregationRequest, AggregationResponse, EffectSize, PooledSummary};
pub use study::{Outcome, Study, StudyFeature, StudyId, StudyStatus};
