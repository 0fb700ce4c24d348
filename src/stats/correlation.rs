use crate::config::{OutlierMode, EPSILON, IQR_FACTOR};
use crate::errors::{QuantError, QuantResult};
use crate::stats::distribution::DistributionFitter;

/// Robust correlation needs at least this many pairs.
const MIN_ROBUST_PAIRS: usize = 4;

/// Pearson correlation over paired samples, with optional marginal outlier
/// exclusion. Each axis gets its own [`DistributionFitter`].
#[derive(Debug, Clone)]
pub struct CorrelationFitter {
    xs: Vec<f64>,
    ys: Vec<f64>,
    mode: OutlierMode,
    fit_x: DistributionFitter,
    fit_y: DistributionFitter,
}

impl CorrelationFitter {
    /// Pairs must line up one-to-one. A length mismatch is a caller bug.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> QuantResult<Self> {
        Self::with_mode(xs, ys, OutlierMode::default())
    }

    pub fn with_mode(xs: Vec<f64>, ys: Vec<f64>, mode: OutlierMode) -> QuantResult<Self> {
        if xs.len() != ys.len() {
            return Err(QuantError::SizeMismatch {
                left: xs.len(),
                right: ys.len(),
            });
        }
        Ok(Self {
            xs,
            ys,
            mode,
            fit_x: DistributionFitter::with_mode(mode),
            fit_y: DistributionFitter::with_mode(mode),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Marginal fitter for X as of the last computation.
    pub fn fit_x(&self) -> &DistributionFitter {
        &self.fit_x
    }

    pub fn fit_y(&self) -> &DistributionFitter {
        &self.fit_y
    }

    fn fit_marginals(&mut self, exclude_outliers: bool) {
        let mut fit_x = DistributionFitter::with_mode(self.mode);
        fit_x.extend(self.xs.iter().copied());
        fit_x.compute(exclude_outliers);

        let mut fit_y = DistributionFitter::with_mode(self.mode);
        fit_y.extend(self.ys.iter().copied());
        fit_y.compute(exclude_outliers);

        self.fit_x = fit_x;
        self.fit_y = fit_y;
    }

    /// Mean of `(x - mean_x)(y - mean_y)` over the pairs where neither
    /// coordinate is an outlier in its own marginal.
    pub fn covariance(&mut self, exclude_outliers: bool) -> f64 {
        self.fit_marginals(exclude_outliers);

        let (mx, my) = (self.fit_x.mean(), self.fit_y.mean());
        let mut sum = 0.0;
        let mut count = 0usize;
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            if exclude_outliers && (self.fit_x.is_outlier(x) || self.fit_y.is_outlier(y)) {
                continue;
            }
            sum += (x - mx) * (y - my);
            count += 1;
        }
        sum / count.max(1) as f64
    }

    /// Zero when either marginal has no spread.
    pub fn compute_correlation(&mut self, exclude_outliers: bool) -> f64 {
        let cov = self.covariance(exclude_outliers);
        let denom = self.fit_x.dev() * self.fit_y.dev();
        if denom.abs() < EPSILON {
            return 0.0;
        }
        cov / denom
    }

    /// Winsorize X, then the Y of the result, and correlate the twice
    /// filtered pairs without further exclusion. `None` below 4 pairs.
    pub fn compute_robust_correlation(&self) -> Option<f64> {
        if self.xs.len() < MIN_ROBUST_PAIRS {
            return None;
        }

        let factor = match self.mode {
            OutlierMode::Interquartile { factor } => factor,
            OutlierMode::TailProbability { .. } => IQR_FACTOR,
        };

        // each pass filters the first axis and hands back the pair swapped
        let (ys, xs) = filter_pass(&self.xs, &self.ys, factor);
        let (xs, ys) = filter_pass(&ys, &xs, factor);

        let mut plain = CorrelationFitter::with_mode(xs, ys, self.mode).ok()?;
        Some(plain.compute_correlation(false))
    }
}

fn filter_pass(first: &[f64], second: &[f64], factor: f64) -> (Vec<f64>, Vec<f64>) {
    let mut fitter = DistributionFitter::from_samples(first.iter().copied());
    let filtered = fitter.filter_outliers(factor);
    (second.to_vec(), filtered)
}
