pub struct StatsHelper;

impl StatsHelper {
    /// Arithmetic mean, ignoring NaNs. `None` when nothing is left.
    pub fn mean<I: IntoIterator<Item = f64>>(samples: I) -> Option<f64> {
        let (sum, count) = samples
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Smallest value, ignoring NaNs. `None` when nothing comparable is left.
    pub fn min<I: IntoIterator<Item = f64>>(samples: I) -> Option<f64> {
        samples
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_sequence_is_none() {
        assert_eq!(StatsHelper::mean(Vec::new()), None);
    }

    #[test]
    fn mean_handles_single_value() {
        assert_eq!(StatsHelper::mean([4.0]), Some(4.0));
        assert_eq!(StatsHelper::mean([1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn mean_skips_nan() {
        assert_eq!(StatsHelper::mean([0.25, f64::NAN, 0.75]), Some(0.5));
        assert_eq!(StatsHelper::mean([f64::NAN, f64::NAN]), None);
    }

    #[test]
    fn min_skips_nan() {
        assert_eq!(StatsHelper::min([0.3, f64::NAN, 0.1]), Some(0.1));
        assert_eq!(StatsHelper::min([f64::NAN]), None);
    }
}
