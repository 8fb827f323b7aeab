use crate::core::histogram::Histogram;
use crate::types::{SnowError, SnowResult};

/// Otsu's method over a bucketed histogram
#[derive(Debug, Clone, Default)]
pub struct OtsuThresholder;

impl OtsuThresholder {
    pub fn new() -> Self {
        Self
    }

    /// Between-class sum of squares for every cut `i` in `1..=N`
    ///
    /// Class A holds buckets `[0, i)`. Entry `i - 1` is `None` when either class
    /// is empty.
    pub fn between_class_variance(histogram: &Histogram) -> Vec<Option<f64>> {
        let counts = &histogram.counts;
        let means = &histogram.means;
        let total: f64 = counts.iter().map(|&c| c as f64).sum();
        let sum: f64 = counts.iter().zip(means).map(|(&c, &m)| c as f64 * m).sum();
        if total == 0.0 {
            return vec![None; counts.len()];
        }
        let mean = sum / total;

        let mut a_count = 0.0;
        let mut a_sum = 0.0;
        counts
            .iter()
            .zip(means)
            .map(|(&c, &m)| {
                a_count += c as f64;
                a_sum += c as f64 * m;
                let b_count = total - a_count;
                if a_count == 0.0 || b_count == 0.0 {
                    return None;
                }
                let a_mean = a_sum / a_count;
                let b_mean = (sum - a_sum) / b_count;
                Some(a_count * (a_mean - mean).powi(2) + b_count * (b_mean - mean).powi(2))
            })
            .collect()
    }

    /// Threshold maximising between-class variance
    ///
    /// Returns the mean of the last bucket of class A for the best cut. Ties go
    /// to the highest cut index.
    pub fn threshold(&self, histogram: &Histogram) -> SnowResult<f64> {
        if histogram.counts.len() != histogram.means.len() {
            return Err(SnowError::InvalidInput(format!(
                "Histogram has {} counts but {} means",
                histogram.counts.len(),
                histogram.means.len()
            )));
        }
        if histogram.total() == 0 {
            return Err(SnowError::DegenerateHistogram {
                reason: "histogram is empty".to_string(),
            });
        }

        let bss = Self::between_class_variance(histogram);
        let mut best: Option<(usize, f64)> = None;
        for (idx, value) in bss.iter().enumerate() {
            if let Some(v) = *value {
                if best.map_or(true, |(_, b)| v >= b) {
                    best = Some((idx, v));
                }
            }
        }

        match best {
            Some((idx, v)) => {
                log::debug!("Otsu cut after bucket {} (BSS {:.6})", idx, v);
                Ok(histogram.means[idx])
            }
            None => Err(SnowError::DegenerateHistogram {
                reason: format!(
                    "no cut separates two non-empty classes ({} non-empty bucket(s))",
                    histogram.non_empty_buckets()
                ),
            }),
        }
    }
}
