//! Equal-width binning transform.
//!
//! Cut points split `[min, max]` into intervals of equal width. Intervals are
//! closed on the right: a value equal to a cut point falls in the lower bin,
//! values below `min` land in bin 0 and values above `max` in the last bin.

/// Bin count for a numeric column: `round(sqrt(max - min))`.
pub(crate) fn numeric_bin_count(min: f64, max: f64) -> usize {
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return 0;
    }
    range.sqrt().round() as usize
}

/// Bin count for a temporal column: `round(sqrt(distinct values))`.
pub(crate) fn temporal_bin_count(distinct: usize) -> usize {
    (distinct as f64).sqrt().round() as usize
}

/// A fitted equal-width discretization.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualWidthBins {
    cut_points: Vec<f64>,
}

impl EqualWidthBins {
    /// Fit `bins` equal-width intervals over `[min, max]`.
    ///
    /// A single bin (or a zero-width range) yields no cut points, so every
    /// value maps to code 0.
    pub fn fit(min: f64, max: f64, bins: usize) -> Self {
        let width = (max - min) / bins.max(1) as f64;
        let cut_points = if bins <= 1 || width <= 0.0 {
            Vec::new()
        } else {
            (1..bins).map(|i| min + width * i as f64).collect()
        };
        Self { cut_points }
    }

    /// Number of bins (codes) produced.
    pub fn bin_count(&self) -> usize {
        self.cut_points.len() + 1
    }

    /// Code of a single value: the first bin whose upper cut is `>= value`.
    pub fn code(&self, value: f64) -> u32 {
        self.cut_points.partition_point(|&cut| value > cut) as u32
    }

    /// Codes for a whole column; missing and NaN values stay missing.
    pub fn transform(&self, values: &[Option<f64>]) -> Vec<Option<u32>> {
        values
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()).map(|x| self.code(x)))
            .collect()
    }

    /// Interval label per code.
    pub fn labels(&self) -> Vec<String> {
        if self.cut_points.is_empty() {
            return vec!["(-inf, inf)".to_string()];
        }

        let mut labels = Vec::with_capacity(self.bin_count());
        let mut lower = f64::NEG_INFINITY;
        for &cut in &self.cut_points {
            labels.push(format!("({}, {}]", format_bound(lower), format_bound(cut)));
            lower = cut;
        }
        labels.push(format!("({}, inf)", format_bound(lower)));
        labels
    }
}

fn format_bound(value: f64) -> String {
    if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if value.abs() >= 1e15 {
        format!("{:e}", value)
    } else {
        format!("{:.4}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_bin_count() {
        assert_eq!(numeric_bin_count(0.0, 100.0), 10);
        assert_eq!(numeric_bin_count(18.0, 90.0), 8); // sqrt(72) = 8.49
        assert_eq!(numeric_bin_count(0.0, 2.25), 2); // sqrt(2.25) = 1.5 rounds up
        assert_eq!(numeric_bin_count(5.0, 5.0), 0);
        assert_eq!(numeric_bin_count(0.0, 0.2), 0);
    }

    #[test]
    fn test_temporal_bin_count() {
        assert_eq!(temporal_bin_count(0), 0);
        assert_eq!(temporal_bin_count(1), 1);
        assert_eq!(temporal_bin_count(10), 3);
        assert_eq!(temporal_bin_count(365), 19);
    }

    #[test]
    fn test_codes_are_right_closed() {
        let bins = EqualWidthBins::fit(0.0, 10.0, 2);
        assert_eq!(bins.bin_count(), 2);
        assert_eq!(bins.code(0.0), 0);
        assert_eq!(bins.code(5.0), 0);
        assert_eq!(bins.code(5.0001), 1);
        assert_eq!(bins.code(10.0), 1);
    }

    #[test]
    fn test_out_of_range_values_clamp_to_edge_bins() {
        let bins = EqualWidthBins::fit(0.0, 9.0, 3);
        assert_eq!(bins.code(-100.0), 0);
        assert_eq!(bins.code(100.0), 2);
    }

    #[test]
    fn test_transform_keeps_missing() {
        let bins = EqualWidthBins::fit(0.0, 4.0, 2);
        let codes = bins.transform(&[Some(1.0), None, Some(3.0), Some(f64::NAN)]);
        assert_eq!(codes, vec![Some(0), None, Some(1), None]);
    }

    #[test]
    fn test_single_bin() {
        let bins = EqualWidthBins::fit(7.0, 7.0, 1);
        assert_eq!(bins.bin_count(), 1);
        assert_eq!(bins.code(7.0), 0);
        assert_eq!(bins.labels(), vec!["(-inf, inf)".to_string()]);
    }

    #[test]
    fn test_code_matches_linear_scan() {
        let bins = EqualWidthBins::fit(-3.0, 97.0, 10);
        for step in 0..=400 {
            let value = -5.0 + step as f64 * 0.26;
            let expected = bins
                .cut_points
                .iter()
                .position(|&cut| value <= cut)
                .unwrap_or(bins.cut_points.len()) as u32;
            assert_eq!(bins.code(value), expected, "value {}", value);
        }
    }

    #[test]
    fn test_huge_range_bin_count_saturates() {
        assert_eq!(numeric_bin_count(0.0, 1.0e300), usize::MAX);
        assert_eq!(numeric_bin_count(f64::MIN, f64::MAX), 0);

        let bins = EqualWidthBins::fit(0.0, 1.0e300, 3);
        assert_eq!(bins.code(5.0), 0);
        assert_eq!(bins.code(1.0e300), 2);
        let last = &bins.labels()[2];
        assert!(last.starts_with("(6.66") && last.ends_with("e299, inf)"), "{}", last);
    }

    #[test]
    fn test_labels() {
        let bins = EqualWidthBins::fit(0.0, 10.0, 4);
        assert_eq!(
            bins.labels(),
            vec!["(-inf, 2.5]", "(2.5, 5]", "(5, 7.5]", "(7.5, inf)"]
        );
    }
}
