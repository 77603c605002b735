/// Computes the median of a slice of values. Returns `None` for empty input.
///
/// An even-length input yields the arithmetic mean of the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Fraction of `part` over `total`. Returns `None` when `total` is zero.
pub fn ratio(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_odd_is_middle_value() {
        assert_eq!(median(&[100.0, 160.0, 40.0]), Some(100.0));
    }

    #[test]
    fn test_median_even_averages_middle_pair() {
        assert_eq!(median(&[10.0, 40.0, 20.0, 30.0]), Some(25.0));
    }

    #[test]
    fn test_ratio_with_zero_total() {
        assert_eq!(ratio(3, 0), None);
        assert_eq!(ratio(1, 4), Some(0.25));
    }
}
