//! Order statistics for box plots.

/// Quantile `p` of `values` by linear interpolation between order statistics.
///
/// NaNs are ignored. Returns `None` when no finite values remain.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, p)
}

/// [`quantile`] over an already sorted slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    let first = *sorted.first()?;
    if p <= 0.0 || n < 2 {
        return Some(first);
    }
    if p >= 1.0 {
        return sorted.last().copied();
    }
    let i = (n - 1) as f64 * p;
    let i0 = i.floor() as usize;
    let lower = sorted[i0];
    let upper = sorted[(i0 + 1).min(n - 1)];
    Some((lower + (upper - lower) * (i - i0 as f64)).min(upper))
}

/// Five-number summary of one box-plot group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl BoxStats {
    /// Summarise `values`. A box needs at least two points.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.len() < 2 {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25)?,
            median: quantile_sorted(&sorted, 0.5)?,
            q3: quantile_sorted(&sorted, 0.75)?,
            max: sorted[sorted.len() - 1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [3.0, 1.0, 2.0, 4.0];
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&values, 0.75), Some(3.25));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
    }

    #[test]
    fn test_quantile_edge_cases() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[7.0], 0.5), Some(7.0));
        assert_eq!(quantile(&[f64::NAN, 2.0, 4.0], 0.5), Some(3.0));
    }

    #[test]
    fn test_box_stats_needs_two_points() {
        assert_eq!(BoxStats::from_values(&[1.0]), None);
        let stats = BoxStats::from_values(&[10.0, 20.0]).unwrap();
        assert_eq!(stats.median, 15.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 20.0);
    }

    #[test]
    fn test_box_stats_ordering_holds() {
        let inputs: [&[f64]; 4] = [
            &[5.0, 5.0, 5.0],
            &[1.0, 100.0],
            &[-3.0, 8.0, 2.5, 2.5, 40.0, -10.0],
            &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7],
        ];
        for values in inputs {
            let s = BoxStats::from_values(values).unwrap();
            assert!(s.min <= s.q1 && s.q1 <= s.median && s.median <= s.q3 && s.q3 <= s.max);
        }
    }

    proptest! {
        #[test]
        fn box_stats_are_ordered_and_bounded(
            values in prop::collection::vec(-1000.0f64..1000.0, 2..50),
        ) {
            let s = BoxStats::from_values(&values).unwrap();
            prop_assert!(s.min <= s.q1);
            prop_assert!(s.q1 <= s.median);
            prop_assert!(s.median <= s.q3);
            prop_assert!(s.q3 <= s.max);
            for v in &values {
                prop_assert!(s.min <= *v && *v <= s.max);
            }
        }

        #[test]
        fn quantile_is_monotone_in_p(
            values in prop::collection::vec(-1000.0f64..1000.0, 1..50),
            p in 0.0f64..1.0,
            q in 0.0f64..1.0,
        ) {
            let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
            prop_assert!(quantile(&values, lo).unwrap() <= quantile(&values, hi).unwrap());
        }
    }
}
