use crate::config::{EPSILON, MONTE_CARLO_DELTA_BUMP, MONTE_CARLO_STEPS};
use crate::math::quadrature::GaussLegendre;
use crate::math::sequence::LinearSequence;
use crate::models::black_scholes::BlackScholes;
use crate::models::OptionPricer;
use crate::state::OptionKind;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Standard-normal range covered by `integrated_price`.
const Z_MAX: f64 = 10.0;
const QUADRATURE_PANELS: usize = 32;

/// Expected discounted payoff over the risk-neutral terminal distribution.
///
/// Sampling is deterministic: the unit probability interval is split into
/// `steps` equal partitions, each partition point is mapped through the
/// inverse CDF of ln(S_T) ~ N(ln F - sigma^2 T / 2, sigma * sqrt(T)) and the
/// discounted payoffs are averaged over the `steps + 1` points. The two end
/// points sit half a partition inside (0, 1) so the inverse CDF stays finite.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloPricer {
    contract: BlackScholes,
    steps: usize,
}

impl MonteCarloPricer {
    pub fn new(contract: BlackScholes) -> Self {
        Self {
            contract,
            steps: MONTE_CARLO_STEPS,
        }
    }

    pub fn with_steps(self, steps: usize) -> Self {
        Self {
            steps: steps.max(1),
            ..self
        }
    }

    pub fn contract(&self) -> &BlackScholes {
        &self.contract
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Parameters of ln(S_T). `None` when the variance is zero.
    fn log_terminal(&self) -> Option<(f64, f64)> {
        let c = &self.contract;
        if c.time() <= 0.0 {
            return None;
        }
        let sd = c.volatility() * c.time().sqrt();
        if sd < EPSILON {
            return None;
        }
        Some((c.forward().ln() - 0.5 * sd * sd, sd))
    }

    #[inline]
    fn payoff(&self, terminal: f64) -> f64 {
        (self.contract.kind().sign() * (terminal - self.contract.strike())).max(0.0)
    }

    pub fn price(&self) -> f64 {
        let Some((mu, sd)) = self.log_terminal() else {
            return self.contract.price();
        };
        let Ok(dist) = Normal::new(mu, sd) else {
            return self.contract.price();
        };

        let n = self.steps.max(1);
        let edge = 0.5 / n as f64;
        let sum: f64 = LinearSequence::new(0.0, 1.0, n)
            .map(|p| self.payoff(dist.inverse_cdf(p.clamp(edge, 1.0 - edge)).exp()))
            .sum();

        self.contract.discount() * sum / (n + 1) as f64
    }

    /// Forward difference with a bump of 1% of spot.
    pub fn delta(&self) -> f64 {
        let spot = self.contract.spot();
        let bump = spot * MONTE_CARLO_DELTA_BUMP;
        if bump.abs() < EPSILON {
            return self.contract.delta();
        }
        let bumped = Self {
            contract: self.contract.with_spot(spot + bump),
            ..*self
        };
        (bumped.price() - self.price()) / bump
    }

    /// The same expectation by Gauss-Legendre quadrature against the normal
    /// density, split at the strike so each piece is smooth.
    pub fn integrated_price(&self, rule: &GaussLegendre) -> f64 {
        let Some((mu, sd)) = self.log_terminal() else {
            return self.contract.price();
        };
        let n = Normal::standard();
        let z_strike = ((self.contract.strike().ln() - mu) / sd).clamp(-Z_MAX, Z_MAX);
        let (lo, hi) = match self.contract.kind() {
            OptionKind::Call => (z_strike, Z_MAX),
            OptionKind::Put => (-Z_MAX, z_strike),
        };

        let expectation = rule.integrate_composite(
            |z| self.payoff((mu + sd * z).exp()) * n.pdf(z),
            lo,
            hi,
            QUADRATURE_PANELS,
        );
        self.contract.discount() * expectation
    }
}

impl OptionPricer for MonteCarloPricer {
    #[inline]
    fn name(&self) -> &'static str {
        "Monte Carlo"
    }

    fn price(&self) -> f64 {
        MonteCarloPricer::price(self)
    }

    fn delta(&self) -> f64 {
        MonteCarloPricer::delta(self)
    }
}
