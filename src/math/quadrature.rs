use crate::errors::{QuantError, QuantResult};
use std::f64::consts::PI;

/// Newton iterations per root when building a rule. Converges in a handful.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Fixed-point Gauss-Legendre rule on [-1, 1].
///
/// Nodes and weights are computed once at construction (Newton iteration on
/// the Legendre recurrence) and reused for every integral.
#[derive(Debug, Clone)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(points: usize) -> QuantResult<Self> {
        if points == 0 {
            return Err(QuantError::InvalidInput(
                "quadrature rule needs at least one point".to_string(),
            ));
        }

        let n = points;
        let nf = n as f64;
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];

        for i in 0..n.div_ceil(2) {
            let mut z = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
            let mut dp = 0.0;

            for _ in 0..MAX_NEWTON_ITERATIONS {
                let mut p1 = 1.0;
                let mut p2 = 0.0;
                for j in 0..n {
                    let p3 = p2;
                    p2 = p1;
                    let jf = j as f64;
                    p1 = ((2.0 * jf + 1.0) * z * p2 - jf * p3) / (jf + 1.0);
                }
                dp = nf * (z * p1 - p2) / (z * z - 1.0);
                let prev = z;
                z = prev - p1 / dp;
                if (z - prev).abs() < 1e-15 {
                    break;
                }
            }

            let w = 2.0 / ((1.0 - z * z) * dp * dp);
            nodes[i] = -z;
            nodes[n - 1 - i] = z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }

        Ok(Self { nodes, weights })
    }

    #[inline]
    pub fn points(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Integrate `f` over [a, b] with a single application of the rule.
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> f64 {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let sum: f64 = self
            .nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(mid + half * x))
            .sum();
        sum * half
    }

    /// Integrate `f` over [a, b] split into `panels` equal sub-intervals.
    pub fn integrate_composite<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64, panels: usize) -> f64 {
        let panels = panels.max(1);
        let width = (b - a) / panels as f64;
        (0..panels)
            .map(|p| {
                let lo = a + width * p as f64;
                self.integrate(&f, lo, lo + width)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_interval_length() {
        for n in [1, 2, 5, 10, 20] {
            let rule = GaussLegendre::new(n).unwrap();
            let total: f64 = rule.weights().iter().sum();
            assert!((total - 2.0).abs() < 1e-12, "n={n} weights sum={total}");
        }
    }

    #[test]
    fn test_exact_for_polynomials() {
        // n points integrate degree 2n-1 exactly
        let rule = GaussLegendre::new(3).unwrap();
        let v = rule.integrate(|x| x.powi(5) + x * x, 0.0, 1.0);
        assert!((v - (1.0 / 6.0 + 1.0 / 3.0)).abs() < 1e-14, "v={v}");
    }

    #[test]
    fn test_composite_exponential() {
        let rule = GaussLegendre::new(8).unwrap();
        let v = rule.integrate_composite(f64::exp, 0.0, 2.0, 4);
        let exact = 2f64.exp() - 1.0;
        assert!((v - exact).abs() < 1e-12, "v={v} exact={exact}");
    }

    #[test]
    fn test_nodes_symmetric() {
        let rule = GaussLegendre::new(7).unwrap();
        let nodes = rule.nodes();
        for i in 0..nodes.len() {
            assert!((nodes[i] + nodes[nodes.len() - 1 - i]).abs() < 1e-14);
        }
        assert!(nodes[3].abs() < 1e-14, "odd rule has a node at zero");
    }

    #[test]
    fn test_zero_points_rejected() {
        assert!(GaussLegendre::new(0).is_err());
    }
}
