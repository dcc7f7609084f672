//! Effect sizes and pooled meta-analysis results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A study's risk ratio with its 95% confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    pub ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl EffectSize {
    pub fn new(ratio: f64, ci_lower: f64, ci_upper: f64) -> Self {
        Self {
            ratio,
            ci_lower,
            ci_upper,
        }
    }
}

/// Pooled result for one group of effect sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PooledSummary {
    /// Pooled risk ratio.
    pub ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Between-study variance.
    pub tau2: f64,
    /// Heterogeneity as a percentage (0-100).
    pub i2: f64,
    /// Test statistic for the pooled effect.
    pub z: f64,
}

impl PooledSummary {
    /// Both confidence bounds lie on the same side of the null effect (1.0).
    pub fn is_significant(&self) -> bool {
        (self.ci_lower <= 1.0 && self.ci_upper <= 1.0) || (self.ci_lower > 1.0 && self.ci_upper > 1.0)
    }

    /// Pooled ratio at or below the null effect.
    pub fn is_improvement(&self) -> bool {
        self.ratio <= 1.0
    }
}

/// Effect sizes to pool, grouped by summary band position.
///
/// Group positions are fixed for a chart's lifetime; the optional trailing
/// group is the concatenation of all named groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Per-chart sequence number, strictly increasing.
    pub generation: u64,
    /// Timeline date the request was computed for.
    pub date: NaiveDate,
    pub groups: Vec<Vec<EffectSize>>,
}

/// Pooled results, parallel to [`AggregationRequest::groups`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResponse {
    pub generation: u64,
    pub date: NaiveDate,
    /// `None` for an empty group.
    pub summaries: Vec<Option<PooledSummary>>,
}
