//! Pooling per-study risk ratios into a meta-analysis summary.

use async_trait::async_trait;
use tracing::debug;

use crate::error::AggregationError;
use crate::models::{EffectSize, PooledSummary};

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

/// Pools grouped effect sizes.
///
/// The result has one entry per input group, in order; empty groups (or
/// groups with no usable effect size) map to `None`.
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn summarize(
        &self,
        groups: Vec<Vec<EffectSize>>,
    ) -> Result<Vec<Option<PooledSummary>>, AggregationError>;
}

/// DerSimonian-Laird random-effects pooling of log risk ratios, with
/// standard errors recovered from the 95% confidence intervals.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomEffects;

impl RandomEffects {
    pub fn new() -> Self {
        Self
    }

    /// Pool one group.
    pub fn pool(effects: &[EffectSize]) -> Option<PooledSummary> {
        // (log ratio, variance)
        let studies: Vec<(f64, f64)> = effects
            .iter()
            .filter(|e| e.ratio > 0.0 && e.ci_lower > 0.0 && e.ci_upper > e.ci_lower)
            .map(|e| {
                let se = (e.ci_upper.ln() - e.ci_lower.ln()) / (2.0 * Z_95);
                (e.ratio.ln(), se * se)
            })
            .collect();
        if studies.len() < effects.len() {
            debug!(
                skipped = effects.len() - studies.len(),
                "Skipping effect sizes without a usable interval"
            );
        }
        if studies.is_empty() {
            return None;
        }

        let weights: Vec<f64> = studies.iter().map(|(_, v)| 1.0 / v).collect();
        let sum_w: f64 = weights.iter().sum();
        let fixed = studies
            .iter()
            .zip(&weights)
            .map(|((y, _), w)| w * y)
            .sum::<f64>()
            / sum_w;

        let q: f64 = studies
            .iter()
            .zip(&weights)
            .map(|((y, _), w)| w * (y - fixed).powi(2))
            .sum();
        let df = (studies.len() - 1) as f64;
        let c = sum_w - weights.iter().map(|w| w * w).sum::<f64>() / sum_w;
        let tau2 = if c > 0.0 { ((q - df) / c).max(0.0) } else { 0.0 };
        let i2 = if q > 0.0 {
            ((q - df) / q).max(0.0) * 100.0
        } else {
            0.0
        };

        let random: Vec<f64> = studies.iter().map(|(_, v)| 1.0 / (v + tau2)).collect();
        let sum_random: f64 = random.iter().sum();
        let pooled = studies
            .iter()
            .zip(&random)
            .map(|((y, _), w)| w * y)
            .sum::<f64>()
            / sum_random;
        let se = (1.0 / sum_random).sqrt();

        Some(PooledSummary {
            ratio: pooled.exp(),
            ci_lower: (pooled - Z_95 * se).exp(),
            ci_upper: (pooled + Z_95 * se).exp(),
            tau2,
            i2,
            z: pooled.abs() / se,
        })
    }
}

#[async_trait]
impl Aggregator for RandomEffects {
    async fn summarize(
        &self,
        groups: Vec<Vec<EffectSize>>,
    ) -> Result<Vec<Option<PooledSummary>>, AggregationError> {
        Ok(groups.iter().map(|group| Self::pool(group)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_single_study_passes_through() {
        let pooled = RandomEffects::pool(&[EffectSize::new(0.5, 0.25, 1.0)]).unwrap();
        assert!(close(pooled.ratio, 0.5));
        assert!(close(pooled.ci_lower, 0.25));
        assert!(close(pooled.ci_upper, 1.0));
        assert_eq!(pooled.tau2, 0.0);
        assert_eq!(pooled.i2, 0.0);
    }

    #[test]
    fn test_identical_studies_narrow_interval() {
        let effect = EffectSize::new(0.5, 0.25, 1.0);
        let pooled = RandomEffects::pool(&[effect, effect, effect, effect]).unwrap();
        assert!(close(pooled.ratio, 0.5));
        assert!(pooled.ci_lower > 0.25 && pooled.ci_upper < 1.0);
        assert_eq!(pooled.tau2, 0.0);
        assert!(pooled.is_significant());
    }

    #[test]
    fn test_heterogeneous_studies() {
        let pooled = RandomEffects::pool(&[
            EffectSize::new(0.2, 0.1, 0.4),
            EffectSize::new(1.5, 1.1, 2.0),
        ])
        .unwrap();
        assert!(pooled.tau2 > 0.0);
        assert!(pooled.i2 > 90.0 && pooled.i2 <= 100.0);
        assert!(pooled.ci_lower < pooled.ratio && pooled.ratio < pooled.ci_upper);
    }

    #[test]
    fn test_unusable_effects_skipped() {
        assert_eq!(RandomEffects::pool(&[]), None);
        assert_eq!(RandomEffects::pool(&[EffectSize::new(0.5, 0.5, 0.5)]), None);
    }

    #[tokio::test]
    async fn test_summarize_keeps_group_positions() {
        let effect = EffectSize::new(0.5, 0.25, 1.0);
        let result = RandomEffects
            .summarize(vec![vec![effect], vec![], vec![effect, effect]])
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result[0].is_some());
        assert!(result[1].is_none());
        assert!(result[2].is_some());
    }
}
