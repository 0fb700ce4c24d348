use crate::config::{
    EPSILON, IMPLIED_TOLERANCE, MAX_VOLATILITY, MIN_VOLATILITY, RATE_SEARCH_STEPS,
    TRADING_DAYS_PER_YEAR,
};
use crate::models::OptionPricer;
use crate::state::OptionKind;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Bracket for the implied interest-rate search.
const MIN_RATE: f64 = -10.0;
const MAX_RATE: f64 = 10.0;

/// Spot and strike searches run over `[x / SCALE_BRACKET, x * SCALE_BRACKET]`.
const SCALE_BRACKET: f64 = 100.0;

/// Volatility bump for `numeric_vega` (one vol point).
const VEGA_BUMP: f64 = 0.01;

/// European option under Black-Scholes-Merton, or Black-76 when the spot
/// is already a forward.
///
/// value = sign * DF * (F * N(sign * d1) - K * N(sign * d2))
///
/// where F = S * exp((r - q) * T) (F = S in Black mode),
///       d1 = (ln(F/K) + 0.5 * sigma^2 * T) / (sigma * sqrt(T)),
///       d2 = d1 - sigma * sqrt(T).
///
/// The contract is immutable. `with_*` builders return a modified copy, which
/// is how the implied-parameter searches vary a single input without touching
/// the original, so concurrent searches over one contract stay independent.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlackScholes {
    kind: OptionKind,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    dividend: f64,
    volatility: f64,
    black: bool,
}

impl BlackScholes {
    /// `time` is a year fraction; zero or negative means expired.
    pub fn new(
        kind: OptionKind,
        spot: f64,
        strike: f64,
        time: f64,
        rate: f64,
        dividend: f64,
        volatility: f64,
    ) -> Self {
        Self {
            kind,
            spot,
            strike,
            time,
            rate,
            dividend,
            volatility: volatility.max(0.0),
            black: false,
        }
    }

    /// Black-76: price directly off a forward.
    pub fn black(kind: OptionKind, forward: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> Self {
        Self {
            black: true,
            ..Self::new(kind, forward, strike, time, rate, 0.0, volatility)
        }
    }

    #[inline]
    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    #[inline]
    pub fn spot(&self) -> f64 {
        self.spot
    }

    #[inline]
    pub fn strike(&self) -> f64 {
        self.strike
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn dividend(&self) -> f64 {
        self.dividend
    }

    #[inline]
    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.black
    }

    pub fn with_spot(self, spot: f64) -> Self {
        Self { spot, ..self }
    }

    pub fn with_strike(self, strike: f64) -> Self {
        Self { strike, ..self }
    }

    pub fn with_time(self, time: f64) -> Self {
        Self { time, ..self }
    }

    pub fn with_rate(self, rate: f64) -> Self {
        Self { rate, ..self }
    }

    pub fn with_dividend(self, dividend: f64) -> Self {
        Self { dividend, ..self }
    }

    pub fn with_volatility(self, volatility: f64) -> Self {
        Self {
            volatility: volatility.max(0.0),
            ..self
        }
    }

    #[inline]
    pub fn forward(&self) -> f64 {
        if self.black {
            self.spot
        } else {
            self.spot * ((self.rate - self.dividend) * self.time.max(0.0)).exp()
        }
    }

    #[inline]
    pub fn discount(&self) -> f64 {
        (-self.rate * self.time.max(0.0)).exp()
    }

    #[inline]
    fn total_vol(&self) -> f64 {
        if self.time <= 0.0 {
            0.0
        } else {
            self.volatility * self.time.sqrt()
        }
    }

    #[inline]
    fn is_degenerate(&self) -> bool {
        self.total_vol() < EPSILON
    }

    /// `None` when the total variance is zero.
    pub fn d1(&self) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        let sd = self.total_vol();
        Some(((self.forward() / self.strike).ln() + 0.5 * sd * sd) / sd)
    }

    pub fn d2(&self) -> Option<f64> {
        self.d1().map(|d1| d1 - self.total_vol())
    }

    /// Payoff if exercised now against the spot.
    #[inline]
    pub fn value_at_expiration(&self) -> f64 {
        (self.kind.sign() * (self.spot - self.strike)).max(0.0)
    }

    pub fn price(&self) -> f64 {
        let Some(d1) = self.d1() else {
            return self.value_at_expiration();
        };
        let d2 = d1 - self.total_vol();
        let sign = self.kind.sign();
        let n = Normal::standard();
        sign * self.discount() * (self.forward() * n.cdf(sign * d1) - self.strike * n.cdf(sign * d2))
    }

    /// dF/dS scaled by the discount factor: exp(-qT), or DF in Black mode.
    #[inline]
    fn carry(&self) -> f64 {
        self.discount() * self.forward() / self.spot
    }

    pub fn delta(&self) -> f64 {
        let Some(d1) = self.d1() else {
            // step function of moneyness
            return match self.kind {
                OptionKind::Call if self.spot > self.strike => 1.0,
                OptionKind::Put if self.spot < self.strike => -1.0,
                _ => 0.0,
            };
        };
        let sign = self.kind.sign();
        sign * self.carry() * Normal::standard().cdf(sign * d1)
    }

    pub fn gamma(&self) -> f64 {
        let Some(d1) = self.d1() else {
            return 0.0;
        };
        self.carry() * Normal::standard().pdf(d1) / (self.spot * self.total_vol())
    }

    /// Per unit of volatility (1.0 = 100 vol points).
    pub fn vega(&self) -> f64 {
        let Some(d1) = self.d1() else {
            return 0.0;
        };
        self.discount() * self.forward() * Normal::standard().pdf(d1) * self.time.sqrt()
    }

    /// dGamma/dSpot.
    pub fn speed(&self) -> f64 {
        let Some(d1) = self.d1() else {
            return 0.0;
        };
        -self.gamma() / self.spot * (d1 / self.total_vol() + 1.0)
    }

    /// Value change over one trading day, by repricing.
    pub fn theta(&self) -> f64 {
        self.theta_over(1.0 / TRADING_DAYS_PER_YEAR)
    }

    /// Value change when `dt` years pass.
    pub fn theta_over(&self, dt: f64) -> f64 {
        self.with_time((self.time - dt).max(0.0)).price() - self.price()
    }

    /// Value change for a one vol point bump, by repricing.
    /// Cross-check for `vega() * 0.01`.
    pub fn numeric_vega(&self) -> f64 {
        self.with_volatility(self.volatility + VEGA_BUMP).price() - self.price()
    }

    pub fn implied_volatility(&self, price: f64) -> Option<f64> {
        self.implied_volatility_within(price, MIN_VOLATILITY, MAX_VOLATILITY)
    }

    /// Volatility that reproduces `price`, searched over `[min_vol, max_vol]`.
    pub fn implied_volatility_within(&self, price: f64, min_vol: f64, max_vol: f64) -> Option<f64> {
        if min_vol.is_nan() || max_vol.is_nan() || min_vol >= max_vol {
            return None;
        }
        let steps = search_steps(max_vol - min_vol, IMPLIED_TOLERANCE);
        bisect(
            |v| self.with_volatility(v).price(),
            price,
            (min_vol, max_vol),
            steps,
            IMPLIED_TOLERANCE,
        )
    }

    pub fn implied_interest_rate(&self, price: f64) -> Option<f64> {
        bisect(
            |r| self.with_rate(r).price(),
            price,
            (MIN_RATE, MAX_RATE),
            RATE_SEARCH_STEPS,
            IMPLIED_TOLERANCE,
        )
    }

    pub fn implied_spot(&self, price: f64) -> Option<f64> {
        let (lo, hi) = scaled_bracket(self.spot);
        let tol = IMPLIED_TOLERANCE * self.spot;
        bisect(
            |s| self.with_spot(s).price(),
            price,
            (lo, hi),
            search_steps(hi - lo, tol),
            tol,
        )
    }

    pub fn implied_strike(&self, price: f64) -> Option<f64> {
        let (lo, hi) = scaled_bracket(self.strike);
        let tol = IMPLIED_TOLERANCE * self.strike;
        bisect(
            |k| self.with_strike(k).price(),
            price,
            (lo, hi),
            search_steps(hi - lo, tol),
            tol,
        )
    }

    /// Strike at which the contract has the given delta.
    pub fn implied_strike_from_delta(&self, delta: f64) -> Option<f64> {
        let (lo, hi) = scaled_bracket(self.strike);
        let tol = IMPLIED_TOLERANCE * self.strike;
        bisect(
            |k| self.with_strike(k).delta(),
            delta,
            (lo, hi),
            search_steps(hi - lo, tol),
            tol,
        )
    }
}

impl OptionPricer for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn price(&self) -> f64 {
        BlackScholes::price(self)
    }

    fn delta(&self) -> f64 {
        BlackScholes::delta(self)
    }
}

#[inline]
fn scaled_bracket(x: f64) -> (f64, f64) {
    (x / SCALE_BRACKET, x * SCALE_BRACKET)
}

/// Halvings needed to shrink `width` below `tolerance`.
#[inline]
fn search_steps(width: f64, tolerance: f64) -> usize {
    (width / tolerance).log2().ceil().max(1.0) as usize
}

/// Fixed-step bisection for `f(x) == target` on a monotone `f`, either
/// direction. A result within `tolerance` of either end of the bracket means
/// the target was never bracketed and is reported as `None`.
fn bisect<F: Fn(f64) -> f64>(
    f: F,
    target: f64,
    (lo, hi): (f64, f64),
    steps: usize,
    tolerance: f64,
) -> Option<f64> {
    let mut a = lo;
    let mut b = hi;
    let below_at_lo = f(a) < target;

    for _ in 0..steps {
        let mid = 0.5 * (a + b);
        if (f(mid) < target) == below_at_lo {
            a = mid;
        } else {
            b = mid;
        }
    }

    let x = 0.5 * (a + b);
    if (x - lo).abs() <= tolerance || (hi - x).abs() <= tolerance {
        return None;
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atm_call() -> BlackScholes {
        BlackScholes::new(OptionKind::Call, 100.0, 100.0, 1.0, 0.0, 0.0, 0.2)
    }

    #[test]
    fn test_atm_benchmark() {
        let p = atm_call().price();
        assert!((p - 7.9656).abs() < 1e-3, "ATM call={p} should be ~7.97");
    }

    #[test]
    fn test_put_call_parity() {
        let call = BlackScholes::new(OptionKind::Call, 100.0, 95.0, 0.75, 0.03, 0.01, 0.3);
        let put = BlackScholes { kind: OptionKind::Put, ..call };
        let lhs = call.price() - put.price();
        let rhs = call.discount() * (call.forward() - call.strike());
        assert!((lhs - rhs).abs() < 1e-10, "parity: {lhs} vs {rhs}");
    }

    #[test]
    fn test_expired_price_is_intrinsic() {
        for kind in [OptionKind::Call, OptionKind::Put] {
            for spot in [80.0, 100.0, 120.0] {
                let c = BlackScholes::new(kind, spot, 100.0, 0.0, 0.05, 0.0, 0.4);
                assert_eq!(c.price(), c.value_at_expiration());
            }
        }
        let negative = BlackScholes::new(OptionKind::Call, 110.0, 100.0, -0.5, 0.05, 0.0, 0.4);
        assert_eq!(negative.price(), 10.0);
    }

    #[test]
    fn test_zero_vol_is_intrinsic() {
        let c = BlackScholes::new(OptionKind::Put, 90.0, 100.0, 1.0, 0.0, 0.0, 0.0);
        assert_eq!(c.price(), 10.0);
        assert_eq!(c.delta(), -1.0);
        assert_eq!(c.gamma(), 0.0);
    }

    #[test]
    fn test_expired_delta_is_step() {
        let itm = BlackScholes::new(OptionKind::Call, 105.0, 100.0, 0.0, 0.0, 0.0, 0.2);
        let otm = itm.with_spot(95.0);
        assert_eq!(itm.delta(), 1.0);
        assert_eq!(otm.delta(), 0.0);
        let put = BlackScholes::new(OptionKind::Put, 95.0, 100.0, 0.0, 0.0, 0.0, 0.2);
        assert_eq!(put.delta(), -1.0);
    }

    #[test]
    fn test_black_mode_prices_off_forward() {
        let bs = BlackScholes::new(OptionKind::Call, 100.0, 100.0, 1.0, 0.05, 0.0, 0.2);
        let b76 = BlackScholes::black(OptionKind::Call, bs.forward(), 100.0, 1.0, 0.05, 0.2);
        assert!((bs.price() - b76.price()).abs() < 1e-10);
    }

    #[test]
    fn test_analytic_greeks_match_bumps() {
        let c = BlackScholes::new(OptionKind::Call, 100.0, 105.0, 0.5, 0.02, 0.01, 0.25);
        let h = 1e-3;
        let up = c.with_spot(100.0 + h);
        let down = c.with_spot(100.0 - h);

        let fd_delta = (up.price() - down.price()) / (2.0 * h);
        assert!((c.delta() - fd_delta).abs() < 1e-6, "delta {} vs {fd_delta}", c.delta());

        let fd_gamma = (up.delta() - down.delta()) / (2.0 * h);
        assert!((c.gamma() - fd_gamma).abs() < 1e-6, "gamma {} vs {fd_gamma}", c.gamma());

        let fd_speed = (up.gamma() - down.gamma()) / (2.0 * h);
        assert!((c.speed() - fd_speed).abs() < 1e-6, "speed {} vs {fd_speed}", c.speed());

        let nv = c.numeric_vega();
        assert!((nv - 0.01 * c.vega()).abs() < 2e-3, "numeric vega {nv} vs {}", 0.01 * c.vega());
    }

    #[test]
    fn test_theta_decays_atm_value() {
        let c = atm_call();
        assert!(c.theta() < 0.0, "theta={}", c.theta());
        assert_eq!(c.theta(), c.theta_over(1.0 / 252.0));
        assert!(c.theta_over(1.0 / 365.0) > c.theta(), "shorter day decays less");
        assert_eq!(c.theta_over(5.0), c.value_at_expiration() - c.price());
    }

    #[test]
    fn test_implied_volatility_round_trip() {
        for vol in [0.05, 0.2, 0.8, 2.5] {
            let c = atm_call().with_volatility(vol);
            let iv = c.implied_volatility(c.price()).unwrap();
            assert!((iv - vol).abs() < 1e-6, "vol={vol} implied={iv}");
        }
    }

    #[test]
    fn test_implied_volatility_unbracketed_is_none() {
        let c = atm_call();
        assert!(c.implied_volatility(150.0).is_none(), "above max attainable price");
        let itm = c.with_spot(120.0);
        assert!(itm.implied_volatility(10.0).is_none(), "below intrinsic");
    }

    #[test]
    fn test_implied_volatility_inverted_bracket_is_none() {
        let c = atm_call();
        let p = c.price();
        assert!(c.implied_volatility_within(p, 0.5, 0.1).is_none());
        assert!(c.implied_volatility_within(p, 0.2, 0.2).is_none());
        assert!(c.implied_volatility_within(p, f64::NAN, 1.0).is_none());
        let iv = c.implied_volatility_within(p, 0.1, 0.5).unwrap();
        assert!((iv - 0.2).abs() < 1e-6, "implied={iv}");
    }

    #[test]
    fn test_implied_rate_round_trip() {
        let c = BlackScholes::new(OptionKind::Call, 100.0, 100.0, 1.0, 0.05, 0.0, 0.2);
        let r = c.implied_interest_rate(c.price()).unwrap();
        assert!((r - 0.05).abs() < 1e-8, "rate={r}");
    }

    #[test]
    fn test_implied_spot_and_strike_round_trip() {
        let c = BlackScholes::new(OptionKind::Put, 100.0, 110.0, 0.5, 0.01, 0.0, 0.3);
        let p = c.price();

        let s = c.with_spot(90.0).implied_spot(p).unwrap();
        assert!((s - 100.0).abs() < 1e-5, "spot={s}");

        let k = c.with_strike(100.0).implied_strike(p).unwrap();
        assert!((k - 110.0).abs() < 1e-5, "strike={k}");
    }

    #[test]
    fn test_strike_from_delta() {
        let c = BlackScholes::new(OptionKind::Call, 100.0, 100.0, 1.0, 0.0, 0.0, 0.2);
        let k = c.implied_strike_from_delta(0.25).unwrap();
        assert!(k > 100.0, "25-delta call is out of the money: {k}");
        assert!((c.with_strike(k).delta() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_search_leaves_original_untouched() {
        let c = atm_call();
        let before = c;
        let _ = c.implied_volatility(10.0);
        let _ = c.implied_strike(5.0);
        assert_eq!(c, before);
    }
}
