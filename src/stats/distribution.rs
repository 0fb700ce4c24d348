use crate::config::{OutlierMode, EPSILON, MAD_SCALE, MIN_FILTER_SAMPLES, MIN_SKEW_SAMPLES, SKEW_IQR_FACTOR};
use crate::errors::{QuantError, QuantResult};
use crate::math::sequence::{LinearSequence, LogSequence};
use crate::state::PriceRecord;
use rand::Rng;

/// Probability mass the density estimate must span before dividing.
const PDF_MASS_STEP: f64 = 0.01;

/// Empirical distribution over a sample set.
///
/// Keeps running `min`/`max`/`total` as samples arrive. Order-dependent queries
/// work on a sorted copy which is rebuilt after any mutation; the insertion
/// order in `samples` is never disturbed.
///
/// Outlier bounds are `None` until [`compute_outliers`](Self::compute_outliers)
/// runs and are cleared again by every mutation.
#[derive(Debug, Clone)]
pub struct DistributionFitter {
    samples: Vec<f64>,
    sorted: Vec<f64>,
    is_sorted: bool,
    min: f64,
    max: f64,
    total: f64,
    inliers: usize,
    mean: f64,
    dev: f64,
    median: Option<f64>,
    mad_dev: Option<f64>,
    iqr_min: Option<f64>,
    iqr_max: Option<f64>,
    mode: OutlierMode,
}

/// One histogram bucket: `[lower, upper)` except the last which is closed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub density: f64,
}

impl HistogramBucket {
    #[inline]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }
}

/// Snapshot of the fitted statistics. Used by the driver for logging.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Summary {
    pub count: usize,
    pub inliers: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: f64,
    pub dev: f64,
    pub median: Option<f64>,
    pub mad_dev: Option<f64>,
    pub iqr_min: Option<f64>,
    pub iqr_max: Option<f64>,
}

impl Default for DistributionFitter {
    fn default() -> Self {
        Self::with_mode(OutlierMode::default())
    }
}

impl DistributionFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: OutlierMode) -> Self {
        Self {
            samples: Vec::new(),
            sorted: Vec::new(),
            is_sorted: true,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            total: 0.0,
            inliers: 0,
            mean: 0.0,
            dev: 0.0,
            median: None,
            mad_dev: None,
            iqr_min: None,
            iqr_max: None,
            mode,
        }
    }

    pub fn from_samples<I: IntoIterator<Item = f64>>(samples: I) -> Self {
        let mut fitter = Self::new();
        fitter.extend(samples);
        fitter
    }

    /// Fit the returns of a price path. Log returns when `log` is set,
    /// simple returns otherwise.
    pub fn from_returns(records: &[PriceRecord], log: bool) -> Self {
        if log {
            Self::from_samples(log_returns(records))
        } else {
            Self::from_samples(returns(records))
        }
    }

    pub fn mode(&self) -> OutlierMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OutlierMode) {
        self.mode = mode;
        self.iqr_min = None;
        self.iqr_max = None;
    }

    /// Add one observation. Non-finite values are the "no observation"
    /// sentinel and are ignored.
    pub fn add_sample(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.samples.push(x);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self.total += x;
        self.invalidate();
    }

    pub fn add_observation(&mut self, x: Option<f64>) {
        if let Some(v) = x {
            self.add_sample(v);
        }
    }

    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, samples: I) {
        for x in samples {
            self.add_sample(x);
        }
    }

    /// Scale every sample by `factor`.
    pub fn multiply(&mut self, factor: f64) {
        if !factor.is_finite() {
            return;
        }
        for x in &mut self.samples {
            *x *= factor;
        }
        self.rebuild_running();
        self.invalidate();
    }

    /// Shift and scale the samples to zero mean and unit deviation.
    /// Zero-deviation sets are only centred.
    pub fn normalize(&mut self) {
        if self.samples.is_empty() {
            return;
        }
        self.compute(false);
        let (mean, dev) = (self.mean, self.dev);
        for x in &mut self.samples {
            *x -= mean;
            if dev > EPSILON {
                *x /= dev;
            }
        }
        self.rebuild_running();
        self.invalidate();
    }

    fn rebuild_running(&mut self) {
        self.min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        self.max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.total = self.samples.iter().sum();
    }

    fn invalidate(&mut self) {
        self.is_sorted = false;
        self.iqr_min = None;
        self.iqr_max = None;
        self.median = None;
        self.mad_dev = None;
    }

    fn ensure_sorted(&mut self) {
        if self.is_sorted {
            return;
        }
        self.sorted.clear();
        self.sorted.extend_from_slice(&self.samples);
        self.sorted.sort_by(f64::total_cmp);
        self.is_sorted = true;
    }

    /// Samples in ascending order.
    pub fn sorted(&mut self) -> &[f64] {
        self.ensure_sorted();
        &self.sorted
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        (!self.samples.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.samples.is_empty()).then_some(self.max)
    }

    /// Running sum, or the inlier sum after [`compute`](Self::compute).
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn inliers(&self) -> usize {
        self.inliers
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn dev(&self) -> f64 {
        self.dev
    }

    pub fn iqr_min(&self) -> Option<f64> {
        self.iqr_min
    }

    pub fn iqr_max(&self) -> Option<f64> {
        self.iqr_max
    }

    pub fn median(&self) -> Option<f64> {
        self.median
    }

    /// MAD scaled to a normal-equivalent deviation.
    pub fn mad_dev(&self) -> Option<f64> {
        self.mad_dev
    }

    /// Compute `iqr_min`/`iqr_max` under the configured outlier mode.
    pub fn compute_outliers(&mut self) {
        self.ensure_sorted();
        let n = self.sorted.len();
        if n == 0 {
            return;
        }

        match self.mode {
            OutlierMode::Interquartile { factor } => {
                let (q1, q3) = quartiles(&self.sorted);
                let iqr = q3 - q1;
                self.iqr_min = Some(q1 - factor * iqr);
                self.iqr_max = Some(q3 + factor * iqr);
            }
            OutlierMode::TailProbability { probability } => {
                let p = probability.clamp(0.0, 0.5);
                self.iqr_min = Some(self.sorted[rounded_index(n as f64 * p, n)]);
                self.iqr_max = Some(self.sorted[rounded_index(n as f64 * (1.0 - p), n)]);
            }
        }
    }

    /// True when `x` lies outside the computed bounds. Always false before
    /// [`compute_outliers`](Self::compute_outliers).
    #[inline]
    pub fn is_outlier(&self, x: f64) -> bool {
        match (self.iqr_min, self.iqr_max) {
            (Some(lo), Some(hi)) => x < lo || x > hi,
            _ => false,
        }
    }

    /// Population mean and deviation over the inliers.
    pub fn compute(&mut self, exclude_outliers: bool) {
        if exclude_outliers {
            self.compute_outliers();
        }

        let mut inliers = 0usize;
        let mut total = 0.0;
        for &x in &self.samples {
            if exclude_outliers && self.is_outlier(x) {
                continue;
            }
            inliers += 1;
            total += x;
        }

        let denom = inliers.max(1) as f64;
        let mean = total / denom;

        let mut sum_sq = 0.0;
        for &x in &self.samples {
            if exclude_outliers && self.is_outlier(x) {
                continue;
            }
            let d = x - mean;
            sum_sq += d * d;
        }

        self.inliers = inliers;
        self.total = total;
        self.mean = mean;
        self.dev = (sum_sq / denom).sqrt();
    }

    /// Inverse CDF: the sample at rank `round((n-1)*prob)`.
    pub fn icdf(&mut self, prob: f64) -> Option<f64> {
        if prob.is_nan() {
            return None;
        }
        self.ensure_sorted();
        let n = self.sorted.len();
        if n == 0 {
            return None;
        }
        let pos = ((n - 1) as f64 * prob.clamp(0.0, 1.0)).round() as usize;
        self.sorted.get(pos).copied()
    }

    /// Rank fraction of the first sample `>= x`; 1.0 when every sample is below.
    pub fn cdf(&mut self, x: f64) -> f64 {
        self.ensure_sorted();
        let n = self.sorted.len();
        if n == 0 {
            return 0.0;
        }
        match self.sorted.iter().position(|&v| v >= x) {
            Some(i) => i as f64 / n as f64,
            None => 1.0,
        }
    }

    /// Local density: scan forward from `x` until the covered probability mass
    /// reaches 1%, then divide by the value span. Zero when the scan runs out.
    pub fn pdf(&mut self, x: f64) -> f64 {
        self.ensure_sorted();
        let n = self.sorted.len();
        let Some(start) = self.sorted.iter().position(|&v| v >= x) else {
            return 0.0;
        };

        let nf = n as f64;
        let v0 = self.sorted[start];
        for j in (start + 1)..n {
            let mass = (j - start) as f64 / nf;
            if mass < PDF_MASS_STEP {
                continue;
            }
            let span = self.sorted[j] - v0;
            if span > EPSILON {
                return mass / span;
            }
        }
        0.0
    }

    /// Median and MAD-based deviation. `None` for an empty set.
    pub fn compute_medians(&mut self) -> Option<(f64, f64)> {
        self.ensure_sorted();
        let median = median_of_sorted(&self.sorted)?;

        let mut deviations: Vec<f64> = self.sorted.iter().map(|x| (x - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        let mad = median_of_sorted(&deviations)? * MAD_SCALE;

        self.median = Some(median);
        self.mad_dev = Some(mad);
        Some((median, mad))
    }

    /// Winsorize: clamp samples outside `[Q1 - factor*IQR, Q3 + factor*IQR]`
    /// to the bound. Sets smaller than 10 come back unchanged, as does any
    /// set when `factor` is negative or not finite.
    /// The result keeps insertion order.
    pub fn filter_outliers(&mut self, factor: f64) -> Vec<f64> {
        if self.samples.len() < MIN_FILTER_SAMPLES || !factor.is_finite() || factor < 0.0 {
            return self.samples.clone();
        }
        self.ensure_sorted();
        let (q1, q3) = quartiles(&self.sorted);
        let iqr = q3 - q1;
        let lo = q1 - factor * iqr;
        let hi = q3 + factor * iqr;
        self.samples.iter().map(|x| x.clamp(lo, hi)).collect()
    }

    /// Sign of the skew from the tail mass beyond 1.5 x IQR: -1, 0 or +1.
    /// `None` below 64 samples.
    pub fn compute_skew(&mut self) -> Option<i8> {
        if self.samples.len() < MIN_SKEW_SAMPLES {
            return None;
        }
        self.ensure_sorted();
        let (q1, q3) = quartiles(&self.sorted);
        let iqr = q3 - q1;
        let lo = q1 - SKEW_IQR_FACTOR * iqr;
        let hi = q3 + SKEW_IQR_FACTOR * iqr;

        // excess beyond the bound, each sample weighted by its 1/n probability
        let nf = self.sorted.len() as f64;
        let lower: f64 = self.sorted.iter().filter(|&&x| x < lo).map(|x| (lo - x) / nf).sum();
        let upper: f64 = self.sorted.iter().filter(|&&x| x > hi).map(|x| (x - hi) / nf).sum();

        let scale = iqr.abs().max(EPSILON);
        let diff = (upper - lower) / scale;
        Some(if diff > EPSILON {
            1
        } else if diff < -EPSILON {
            -1
        } else {
            0
        })
    }

    /// One existing sample drawn uniformly, with replacement.
    pub fn rnd<R: Rng>(&self, rng: &mut R) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples[rng.gen_range(0..self.samples.len())])
    }

    /// Sum of `n` independent draws: the n-fold convolution of the empirical
    /// distribution.
    pub fn rnd_sum<R: Rng>(&self, rng: &mut R, n: usize) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let len = self.samples.len();
        Some((0..n).map(|_| self.samples[rng.gen_range(0..len)]).sum())
    }

    /// Equal-width histogram over `[min, max]`.
    pub fn histogram(&mut self, buckets: usize) -> Vec<HistogramBucket> {
        if self.samples.is_empty() || buckets == 0 {
            return Vec::new();
        }
        let edges = LinearSequence::new(self.min, self.max, buckets);
        let width = edges.step_size();
        let nf = self.samples.len() as f64;

        let mut counts = vec![0usize; buckets];
        for &x in &self.samples {
            let idx = if width > EPSILON {
                ((x - self.min) / width).floor() as usize
            } else {
                0
            };
            counts[idx.min(buckets - 1)] += 1;
        }

        build_buckets(&counts, |i| edges.value(i), nf)
    }

    /// Histogram with geometrically spaced buckets over the positive samples.
    pub fn log_histogram(&mut self, buckets: usize) -> QuantResult<Vec<HistogramBucket>> {
        if buckets == 0 {
            return Ok(Vec::new());
        }
        let positive: Vec<f64> = self.samples.iter().copied().filter(|&x| x > 0.0).collect();
        if positive.is_empty() {
            return Err(QuantError::InvalidInput(
                "log histogram needs positive samples".to_string(),
            ));
        }
        let lo = positive.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = positive.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let edges = LogSequence::new(lo, hi, buckets)?;
        let log_width = (hi / lo).ln() / buckets as f64;
        let nf = positive.len() as f64;

        let mut counts = vec![0usize; buckets];
        for &x in &positive {
            let idx = if log_width > EPSILON {
                ((x / lo).ln() / log_width).floor() as usize
            } else {
                0
            };
            counts[idx.min(buckets - 1)] += 1;
        }

        Ok(build_buckets(&counts, |i| edges.value(i), nf))
    }

    pub fn summary(&self) -> Summary {
        Summary {
            count: self.samples.len(),
            inliers: self.inliers,
            min: self.min(),
            max: self.max(),
            mean: self.mean,
            dev: self.dev,
            median: self.median,
            mad_dev: self.mad_dev,
            iqr_min: self.iqr_min,
            iqr_max: self.iqr_max,
        }
    }
}

fn build_buckets<F: Fn(usize) -> f64>(counts: &[usize], edge: F, total: f64) -> Vec<HistogramBucket> {
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let lower = edge(i);
            let upper = edge(i + 1);
            let width = upper - lower;
            let density = if width > EPSILON {
                count as f64 / (total * width)
            } else {
                0.0
            };
            HistogramBucket {
                lower,
                upper,
                count,
                density,
            }
        })
        .collect()
}

#[inline]
fn rounded_index(pos: f64, n: usize) -> usize {
    (pos.round().max(0.0) as usize).min(n.saturating_sub(1))
}

/// Q1/Q3 as the sorted values at rounded positions `0.25n` and `0.75n`.
fn quartiles(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    let nf = n as f64;
    (
        sorted[rounded_index(0.25 * nf, n)],
        sorted[rounded_index(0.75 * nf, n)],
    )
}

fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 0 {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    } else {
        sorted[n / 2]
    })
}

// ── Derived series ──

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample (co)variance of two lists with Bessel's correction.
/// `var(xs, xs)` is the sample variance. Differs from the population
/// deviation used by [`DistributionFitter::compute`].
pub fn var(xs: &[f64], ys: &[f64]) -> QuantResult<f64> {
    if xs.len() != ys.len() {
        return Err(QuantError::SizeMismatch {
            left: xs.len(),
            right: ys.len(),
        });
    }
    let n = xs.len();
    if n < 2 {
        return Ok(0.0);
    }
    let mx = mean(xs);
    let my = mean(ys);
    let sum: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Ok(sum / (n - 1) as f64)
}

/// Adjacent-pair returns. A non-positive price breaks the chain: no return
/// is taken across it.
fn chained_returns<F: Fn(f64, f64) -> f64>(records: &[PriceRecord], f: F) -> Vec<f64> {
    let mut out = Vec::with_capacity(records.len().saturating_sub(1));
    let mut prev: Option<f64> = None;
    for r in records {
        if r.price <= 0.0 || !r.price.is_finite() {
            prev = None;
            continue;
        }
        if let Some(p0) = prev {
            out.push(f(p0, r.price));
        }
        prev = Some(r.price);
    }
    out
}

pub fn returns(records: &[PriceRecord]) -> Vec<f64> {
    chained_returns(records, |p0, p1| p1 / p0 - 1.0)
}

pub fn log_returns(records: &[PriceRecord]) -> Vec<f64> {
    chained_returns(records, |p0, p1| (p1 / p0).ln())
}

pub fn squared(xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|x| x * x).collect()
}

pub fn absolute(xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|x| x.abs()).collect()
}

pub fn cumulative_sums(xs: &[f64]) -> Vec<f64> {
    xs.iter()
        .scan(0.0, |acc, x| {
            *acc += x;
            Some(*acc)
        })
        .collect()
}
