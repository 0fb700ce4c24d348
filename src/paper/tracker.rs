//! Strategy metrics.
//! Pure functions: they read strategies and return computed values.

use crate::errors::QuantResult;
use crate::paper::strategy::Strategy;
use std::collections::HashMap;

/// Metrics for every strategy in a run. Logged as JSON by the driver.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregateMetrics {
    pub strategies: Vec<StrategyMetrics>,
    pub total_profit: f64,
    pub total_theoretical_profit: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StrategyMetrics {
    pub name: String,
    pub total_trades: usize,
    pub open_positions: usize,
    pub total_cost: f64,
    pub total_commission: f64,
    pub realized_pnl: f64,
    pub profit: f64,
    pub theoretical_profit: f64,
}

pub fn compute_metrics(strategy: &Strategy, marks: &HashMap<String, f64>) -> QuantResult<StrategyMetrics> {
    let positions = strategy.positions()?;
    Ok(StrategyMetrics {
        name: strategy.name().to_string(),
        total_trades: strategy.trades().len(),
        open_positions: positions.values().filter(|p| !p.is_flat()).count(),
        total_cost: strategy.total_cost(),
        total_commission: strategy.total_commission(),
        realized_pnl: positions.values().map(|p| p.realized_pnl()).sum(),
        profit: strategy.profit(marks)?,
        theoretical_profit: strategy.theoretical_profit(),
    })
}

/// Compute aggregate metrics over all strategies at the given marks.
pub fn compute_aggregate(strategies: &[Strategy], marks: &HashMap<String, f64>) -> QuantResult<AggregateMetrics> {
    let metrics = strategies
        .iter()
        .map(|s| compute_metrics(s, marks))
        .collect::<QuantResult<Vec<_>>>()?;

    Ok(AggregateMetrics {
        total_profit: metrics.iter().map(|m| m.profit).sum(),
        total_theoretical_profit: metrics.iter().map(|m| m.theoretical_profit).sum(),
        strategies: metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::trade::Trade;
    use chrono::NaiveDate;

    #[test]
    fn test_aggregate() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut a = Strategy::new("a");
        a.add_trade(Trade::new(day, "X", 2.0, 10.0, 11.0));
        let mut b = Strategy::new("b");
        b.add_trade(Trade::new(day, "X", 1.0, 10.0, 10.0));
        b.add_trade(Trade::new(day, "X", -1.0, 12.0, 12.0).with_commission(0.5));

        let marks = HashMap::from([("X".to_string(), 13.0)]);
        let agg = compute_aggregate(&[a, b], &marks).unwrap();
        assert_eq!(agg.strategies.len(), 2);
        assert_eq!(agg.strategies[0].open_positions, 1);
        assert_eq!(agg.strategies[1].open_positions, 0);
        assert!((agg.strategies[0].profit - 6.0).abs() < 1e-12);
        assert!((agg.strategies[1].realized_pnl - 1.5).abs() < 1e-12);
        assert!((agg.total_profit - 7.5).abs() < 1e-12);
        assert!((agg.total_theoretical_profit - 1.5).abs() < 1e-12);

        let json = serde_json::to_string(&agg).unwrap();
        assert!(json.contains("\"name\":\"a\""));
    }
}
