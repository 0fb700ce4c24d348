use crate::config::{OutlierMode, OUTLIER_PROBABILITY};
use crate::state::PriceRecord;
use crate::stats::distribution::{log_returns, DistributionFitter};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rand::Rng;
use rand_distr::StandardNormal;

/// Lognormal dynamics for one asset: dS/S = growth dt + volatility dW.
///
/// Discretised exactly per step:
///
/// S_{t+dt} = S_t * exp((growth - volatility^2 / 2) * dt + volatility * sqrt(dt) * Z)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalProcess {
    growth: f64,
    volatility: f64,
}

/// Two price paths advanced on the same days with correlated shocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedPath {
    pub first: Vec<PriceRecord>,
    pub second: Vec<PriceRecord>,
}

impl NormalProcess {
    pub fn new(growth: f64, volatility: f64) -> Self {
        Self {
            growth,
            volatility: volatility.max(0.0),
        }
    }

    #[inline]
    pub fn growth(&self) -> f64 {
        self.growth
    }

    #[inline]
    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    /// E[S_t] given S_0 = spot.
    pub fn forward_mean(&self, spot: f64, t: f64) -> f64 {
        spot * (self.growth * t).exp()
    }

    /// Standard deviation of S_t given S_0 = spot.
    pub fn forward_dev(&self, spot: f64, t: f64) -> f64 {
        let v2t = self.volatility * self.volatility * t.max(0.0);
        self.forward_mean(spot, t) * (v2t.exp() - 1.0).sqrt()
    }

    /// Mean and deviation of ln S_t.
    pub fn forward_distribution(&self, spot: f64, t: f64) -> (f64, f64) {
        let t = t.max(0.0);
        (
            spot.ln() + (self.growth - 0.5 * self.volatility * self.volatility) * t,
            self.volatility * t.sqrt(),
        )
    }

    #[inline]
    fn step(&self, price: f64, dt: f64, z: f64) -> f64 {
        let drift = (self.growth - 0.5 * self.volatility * self.volatility) * dt;
        price * (drift + self.volatility * dt.sqrt() * z).exp()
    }

    /// `steps` moves of length `dt` starting at `spot` (included as the first
    /// element). Gives up with `None` as soon as a price drops below `floor`.
    pub fn generate_forward<R: Rng>(
        &self,
        rng: &mut R,
        spot: f64,
        steps: usize,
        dt: f64,
        floor: f64,
    ) -> Option<Vec<f64>> {
        if spot < floor {
            return None;
        }
        let mut path = Vec::with_capacity(steps + 1);
        let mut price = spot;
        path.push(price);
        for i in 0..steps {
            let z: f64 = rng.sample(StandardNormal);
            price = self.step(price, dt, z);
            if price < floor {
                tracing::debug!(step = i, price, floor, "forward path breached price floor");
                return None;
            }
            path.push(price);
        }
        Some(path)
    }

    /// Day-by-day path over trading days from `start.day` through `last_day`,
    /// each day `dt` years long. Prices that would fall below `floor` are
    /// clamped to it and the path carries on from there.
    pub fn generate_path<R: Rng>(
        &self,
        rng: &mut R,
        start: PriceRecord,
        last_day: NaiveDate,
        dt: f64,
        floor: f64,
    ) -> Vec<PriceRecord> {
        let mut path = vec![PriceRecord::new(start.day, start.price.max(floor))];
        let mut day = start.day;
        let mut price = start.price.max(floor);

        while let Some(next) = next_trading_day(day).filter(|d| *d <= last_day) {
            let z: f64 = rng.sample(StandardNormal);
            price = self.step(price, dt, z).max(floor);
            path.push(PriceRecord::new(next, price));
            day = next;
        }
        path
    }

    /// Advance `self` and `other` over the same trading days. The second
    /// shock is `rho * z1 + sqrt(1 - rho^2) * z_independent`.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_correlated_path<R: Rng>(
        &self,
        other: &NormalProcess,
        rho: f64,
        rng: &mut R,
        start: PriceRecord,
        other_spot: f64,
        last_day: NaiveDate,
        dt: f64,
        floor: f64,
    ) -> CorrelatedPath {
        let rho = rho.clamp(-1.0, 1.0);
        let independent_weight = (1.0 - rho * rho).sqrt();

        let mut a = start.price.max(floor);
        let mut b = other_spot.max(floor);
        let mut first = vec![PriceRecord::new(start.day, a)];
        let mut second = vec![PriceRecord::new(start.day, b)];
        let mut day = start.day;

        while let Some(next) = next_trading_day(day).filter(|d| *d <= last_day) {
            let z1: f64 = rng.sample(StandardNormal);
            let zi: f64 = rng.sample(StandardNormal);
            let z2 = rho * z1 + independent_weight * zi;

            a = self.step(a, dt, z1).max(floor);
            b = other.step(b, dt, z2).max(floor);
            first.push(PriceRecord::new(next, a));
            second.push(PriceRecord::new(next, b));
            day = next;
        }

        CorrelatedPath { first, second }
    }

    /// Calibrate from observed prices sampled every `dt` years, trimming the
    /// default 1% tails when `exclude_outliers` is set.
    pub fn parse_normal_process(prices: &[PriceRecord], dt: f64, exclude_outliers: bool) -> Option<Self> {
        Self::parse_normal_process_with(prices, dt, exclude_outliers, OUTLIER_PROBABILITY)
    }

    /// volatility = dev / sqrt(dt), growth = volatility^2 / 2 + mean / dt
    /// over the log returns. `None` without at least one return.
    pub fn parse_normal_process_with(
        prices: &[PriceRecord],
        dt: f64,
        exclude_outliers: bool,
        outlier_probability: f64,
    ) -> Option<Self> {
        if dt <= 0.0 {
            return None;
        }
        let mut fitter = DistributionFitter::with_mode(OutlierMode::TailProbability {
            probability: outlier_probability,
        });
        fitter.extend(log_returns(prices));
        if fitter.is_empty() {
            return None;
        }
        fitter.compute(exclude_outliers);
        if fitter.inliers() == 0 {
            return None;
        }

        let volatility = fitter.dev() / dt.sqrt();
        let growth = 0.5 * volatility * volatility + fitter.mean() / dt;
        tracing::debug!(
            returns = fitter.len(),
            inliers = fitter.inliers(),
            growth,
            volatility,
            "calibrated normal process"
        );
        Some(Self::new(growth, volatility))
    }
}

/// Next weekday after `day`.
pub fn next_trading_day(day: NaiveDate) -> Option<NaiveDate> {
    let mut next = day.checked_add_days(Days::new(1))?;
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next.checked_add_days(Days::new(1))?;
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MIN_PRICE, TRADING_DAYS_PER_YEAR};
    use crate::state::prices_of;
    use crate::stats::correlation::CorrelationFitter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DAY: f64 = 1.0 / TRADING_DAYS_PER_YEAR;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_path_skips_weekends() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = NormalProcess::new(0.05, 0.2);
        // 2024-01-01 is a Monday
        let path = p.generate_path(&mut rng, PriceRecord::new(ymd(2024, 1, 1), 100.0), ymd(2024, 1, 14), DAY, MIN_PRICE);
        assert_eq!(path.len(), 10);
        assert_eq!(path[5].day, ymd(2024, 1, 8));
        assert!(path.windows(2).all(|w| w[0].day < w[1].day));
    }

    #[test]
    fn test_path_never_below_floor() {
        let mut rng = StdRng::seed_from_u64(2);
        let crash = NormalProcess::new(-400.0, 1.5);
        let path = crash.generate_path(&mut rng, PriceRecord::new(ymd(2024, 1, 1), 1.0), ymd(2025, 12, 31), DAY, MIN_PRICE);
        assert!(path.len() > 500);
        assert!(path.iter().all(|r| r.price >= MIN_PRICE));
        assert_eq!(path.last().map(|r| r.price), Some(MIN_PRICE), "clamped, not aborted");
    }

    #[test]
    fn test_forward_aborts_on_floor_breach() {
        let mut rng = StdRng::seed_from_u64(3);
        let crash = NormalProcess::new(-50.0, 0.1);
        assert!(crash.generate_forward(&mut rng, 1.0, 1000, 1.0 / 252.0, MIN_PRICE).is_none());

        let calm = NormalProcess::new(0.05, 0.2);
        let fwd = calm.generate_forward(&mut rng, 100.0, 252, 1.0 / 252.0, MIN_PRICE).unwrap();
        assert_eq!(fwd.len(), 253);
        assert_eq!(fwd[0], 100.0);
    }

    #[test]
    fn test_zero_vol_is_deterministic_growth() {
        let mut rng = StdRng::seed_from_u64(4);
        let p = NormalProcess::new(0.1, 0.0);
        let fwd = p.generate_forward(&mut rng, 100.0, 10, 0.1, MIN_PRICE).unwrap();
        assert!((fwd[10] - p.forward_mean(100.0, 1.0)).abs() < 1e-9);
        assert_eq!(p.forward_dev(100.0, 1.0), 0.0);
    }

    #[test]
    fn test_calibration_recovers_parameters() {
        let mut rng = StdRng::seed_from_u64(5);
        let truth = NormalProcess::new(0.1, 0.3);
        let path = truth.generate_path(&mut rng, PriceRecord::new(ymd(2000, 1, 3), 100.0), ymd(2019, 12, 31), DAY, MIN_PRICE);

        let fitted = NormalProcess::parse_normal_process(&path, 1.0 / TRADING_DAYS_PER_YEAR, false).unwrap();
        assert!((fitted.volatility() - 0.3).abs() < 0.02, "vol={}", fitted.volatility());
        assert!((fitted.growth() - 0.1).abs() < 0.3, "growth={}", fitted.growth());

        let trimmed = NormalProcess::parse_normal_process(&path, 1.0 / TRADING_DAYS_PER_YEAR, true).unwrap();
        assert!(trimmed.volatility() < fitted.volatility());
    }

    #[test]
    fn test_calibration_round_trip_at_calendar_day_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let dt = 1.0 / 365.0;
        let truth = NormalProcess::new(0.05, 0.25);
        let path = truth.generate_path(&mut rng, PriceRecord::new(ymd(2000, 1, 3), 100.0), ymd(2019, 12, 31), dt, MIN_PRICE);

        let fitted = NormalProcess::parse_normal_process(&path, dt, false).unwrap();
        assert!((fitted.volatility() - 0.25).abs() < 0.02, "vol={}", fitted.volatility());

        let mismatched = NormalProcess::parse_normal_process(&path, DAY, false).unwrap();
        assert!(mismatched.volatility() < 0.23, "vol={}", mismatched.volatility());
    }

    #[test]
    fn test_calibration_needs_returns() {
        let single = [PriceRecord::new(ymd(2024, 1, 2), 100.0)];
        assert!(NormalProcess::parse_normal_process(&single, 1.0 / 252.0, false).is_none());
    }

    #[test]
    fn test_correlated_paths() {
        let mut rng = StdRng::seed_from_u64(6);
        let p = NormalProcess::new(0.05, 0.25);
        let start = PriceRecord::new(ymd(2020, 1, 1), 100.0);

        let same = p.generate_correlated_path(&p, 1.0, &mut rng, start, 100.0, ymd(2020, 6, 30), DAY, MIN_PRICE);
        assert_eq!(prices_of(&same.first), prices_of(&same.second));

        let pair = p.generate_correlated_path(&p, 0.8, &mut rng, start, 50.0, ymd(2027, 12, 31), DAY, MIN_PRICE);
        assert_eq!(pair.first.len(), pair.second.len());
        let mut c = CorrelationFitter::new(log_returns(&pair.first), log_returns(&pair.second)).unwrap();
        let r = c.compute_correlation(false);
        assert!((r - 0.8).abs() < 0.05, "sample correlation={r}");
    }
}
