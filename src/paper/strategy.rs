use crate::errors::QuantResult;
use crate::paper::position::Position;
use crate::paper::trade::Trade;
use std::collections::{BTreeMap, HashMap};

/// Ordered list of trades under one name. Owns its trades; positions are
/// rebuilt on demand.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Strategy {
    name: String,
    trades: Vec<Trade>,
}

impl Strategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trades: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn add_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn total_cost(&self) -> f64 {
        self.trades.iter().map(Trade::cost).sum()
    }

    pub fn total_commission(&self) -> f64 {
        self.trades.iter().map(Trade::commission).sum()
    }

    /// Edge booked against model values, net of commission.
    pub fn theoretical_profit(&self) -> f64 {
        self.trades
            .iter()
            .map(|t| t.theoretical_edge() - t.commission())
            .sum()
    }

    /// One position per instrument, in instrument order.
    pub fn positions(&self) -> QuantResult<BTreeMap<String, Position>> {
        let mut positions: BTreeMap<String, Position> = BTreeMap::new();
        for trade in &self.trades {
            positions
                .entry(trade.instrument.clone())
                .or_insert_with(|| Position::new(trade.instrument.clone()))
                .apply(trade)?;
        }
        Ok(positions)
    }

    /// Realized plus unrealized P&L. Open positions without a mark are
    /// carried at zero value.
    pub fn profit(&self, marks: &HashMap<String, f64>) -> QuantResult<f64> {
        let total = self
            .positions()?
            .values()
            .map(|p| {
                let open = marks.get(p.instrument()).copied().unwrap_or(0.0);
                p.realized_pnl() + p.mark_to_market(open)
            })
            .sum();
        Ok(total)
    }

    pub fn realized_profit(&self) -> QuantResult<f64> {
        Ok(self.positions()?.values().map(Position::realized_pnl).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn sample() -> Strategy {
        let mut s = Strategy::new("straddle");
        s.add_trade(Trade::new(day(3), "C100", 10.0, 5.0, 5.4).with_commission(1.0));
        s.add_trade(Trade::new(day(3), "P100", 10.0, 4.0, 4.1).with_commission(1.0));
        s.add_trade(Trade::new(day(7), "C100", -10.0, 6.0, 6.0).with_commission(1.0));
        s
    }

    #[test]
    fn test_totals() {
        let s = sample();
        assert_eq!(s.trades().len(), 3);
        assert!((s.total_commission() - 3.0).abs() < 1e-12);
        assert!((s.total_cost() - (51.0 + 41.0 - 59.0)).abs() < 1e-12);
        assert!((s.theoretical_profit() - (4.0 + 1.0 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_positions_are_derived() {
        let s = sample();
        let positions = s.positions().unwrap();
        let keys: Vec<&String> = positions.keys().collect();
        assert_eq!(keys, ["C100", "P100"]);

        let call = &positions["C100"];
        assert!(call.is_flat());
        assert!((call.realized_pnl() - 8.0).abs() < 1e-12);

        let put = &positions["P100"];
        assert_eq!(put.total_quantity(), 10.0);
        assert!((s.realized_profit().unwrap() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_profit_with_marks() {
        let s = sample();
        let mut marks = HashMap::new();
        marks.insert("P100".to_string(), 3.5);
        // 8 realized on the call, 35 - 41 open on the put
        assert!((s.profit(&marks).unwrap() - 2.0).abs() < 1e-12);
        assert!((s.profit(&HashMap::new()).unwrap() + 33.0).abs() < 1e-12);
    }
}
