use crate::types::{Raster, SnowError, SnowResult};
use ndarray::Array2;
use serde::Serialize;

/// Histogram parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramParams {
    pub buckets: usize,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self { buckets: 256 }
    }
}

/// Equal-width histogram of valid samples
///
/// `means[k]` is the mean of the samples that fell into bucket `k`; empty
/// buckets carry their centre over the observed `[min, max]`. Bucket ranges do
/// not overlap, so the means are non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub means: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl Histogram {
    /// Histogram from precomputed buckets
    pub fn from_parts(counts: Vec<u64>, means: Vec<f64>) -> SnowResult<Self> {
        if counts.len() != means.len() {
            return Err(SnowError::InvalidInput(format!(
                "Histogram has {} counts but {} means",
                counts.len(),
                means.len()
            )));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(SnowError::InvalidInput("Histogram means must be finite".to_string()));
        }
        let min = means.first().copied().unwrap_or(0.0);
        let max = means.last().copied().unwrap_or(0.0);
        Ok(Self { counts, means, min, max })
    }

    /// Bucket the valid samples of `raster`, optionally restricted to `region`
    pub fn from_raster(raster: &Raster, region: Option<&Array2<bool>>, params: &HistogramParams) -> SnowResult<Self> {
        if params.buckets == 0 {
            return Err(SnowError::Config("Histogram needs at least one bucket".to_string()));
        }
        if let Some(region) = region {
            if region.dim() != raster.dim() {
                return Err(SnowError::InvalidInput(format!(
                    "Region {:?} does not match raster {:?}",
                    region.dim(),
                    raster.dim()
                )));
            }
        }

        let samples: Vec<f64> = raster
            .data()
            .indexed_iter()
            .filter(|&((r, c), _)| raster.valid()[[r, c]] && region.map_or(true, |m| m[[r, c]]))
            .map(|(_, &v)| v as f64)
            .collect();

        Ok(Self::from_samples(&samples, params.buckets))
    }

    /// Equal-width buckets over the range of `samples`
    pub fn from_samples(samples: &[f64], buckets: usize) -> Self {
        let buckets = buckets.max(1);
        let mut counts = vec![0u64; buckets];

        let (min, max) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        if samples.is_empty() {
            return Self {
                counts,
                means: vec![0.0; buckets],
                min: 0.0,
                max: 0.0,
            };
        }

        let width = (max - min) / buckets as f64;
        let mut sums = vec![0.0f64; buckets];
        for &v in samples {
            let k = if width > 0.0 {
                (((v - min) / width) as usize).min(buckets - 1)
            } else {
                0
            };
            counts[k] += 1;
            sums[k] += v;
        }

        let means = (0..buckets)
            .map(|k| match counts[k] {
                _ if width <= 0.0 => min,
                0 => min + (k as f64 + 0.5) * width,
                n => sums[k] / n as f64,
            })
            .collect();

        Self { counts, means, min, max }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn non_empty_buckets(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}
