use crate::errors::{QuantError, QuantResult};
use crate::models::OptionPricer;
use crate::paper::trade::Trade;

/// Running quantity and cost for one instrument. Derived from trades and
/// thrown away after use.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Position {
    instrument: String,
    total_quantity: f64,
    total_cost: f64,
    realized_pnl: f64,
}

impl Position {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            total_quantity: 0.0,
            total_cost: 0.0,
            realized_pnl: 0.0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn total_quantity(&self) -> f64 {
        self.total_quantity
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.total_quantity.abs() < 1e-12
    }

    pub fn apply(&mut self, trade: &Trade) -> QuantResult<()> {
        if trade.instrument != self.instrument {
            return Err(QuantError::InvalidInput(format!(
                "trade for {} applied to position in {}",
                trade.instrument, self.instrument
            )));
        }
        self.total_quantity += trade.quantity;
        self.total_cost += trade.cost();
        if self.is_flat() {
            self.realize();
        }
        Ok(())
    }

    /// Flatten at `price` and book the result. Returns the realized P&L.
    pub fn close(&mut self, price: f64) -> f64 {
        self.total_cost -= self.total_quantity * price;
        self.total_quantity = 0.0;
        self.realize()
    }

    fn realize(&mut self) -> f64 {
        let pnl = -self.total_cost;
        self.realized_pnl += pnl;
        self.total_quantity = 0.0;
        self.total_cost = 0.0;
        pnl
    }

    /// Unrealized P&L at a market price.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.total_quantity * price - self.total_cost
    }

    /// Unrealized P&L at the model value.
    pub fn theoretical_pnl(&self, pricer: &dyn OptionPricer) -> f64 {
        self.mark_to_market(pricer.price())
    }

    /// Net delta of the open quantity under `pricer`.
    pub fn delta_exposure(&self, pricer: &dyn OptionPricer) -> f64 {
        self.total_quantity * pricer.delta()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use crate::state::OptionKind;
    use chrono::NaiveDate;

    fn trade(quantity: f64, price: f64) -> Trade {
        Trade::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), "OPT", quantity, price, price)
    }

    #[test]
    fn test_close_realizes_negative_cost() {
        let mut p = Position::new("OPT");
        p.apply(&trade(10.0, 4.0)).unwrap();
        p.apply(&trade(5.0, 6.0)).unwrap();
        assert_eq!(p.total_quantity(), 15.0);
        assert_eq!(p.total_cost(), 70.0);
        assert!((p.mark_to_market(5.0) - 5.0).abs() < 1e-12);

        let pnl = p.close(7.0);
        assert!((pnl - 35.0).abs() < 1e-12, "pnl={pnl}");
        assert!(p.is_flat());
        assert_eq!(p.total_cost(), 0.0);
        assert_eq!(p.realized_pnl(), pnl);
    }

    #[test]
    fn test_offsetting_trade_realizes() {
        let mut p = Position::new("OPT");
        p.apply(&trade(3.0, 2.0)).unwrap();
        p.apply(&trade(-3.0, 1.5)).unwrap();
        assert!(p.is_flat());
        assert!((p.realized_pnl() + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_instrument_rejected() {
        let mut p = Position::new("OTHER");
        assert!(p.apply(&trade(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_theoretical_pnl_uses_model_value() {
        let bs = BlackScholes::new(OptionKind::Call, 100.0, 100.0, 1.0, 0.0, 0.0, 0.2);
        let mut p = Position::new("OPT");
        p.apply(&trade(2.0, 7.0)).unwrap();
        let expected = 2.0 * bs.price() - 14.0;
        assert!((p.theoretical_pnl(&bs) - expected).abs() < 1e-12);
        assert!((p.delta_exposure(&bs) - 2.0 * bs.delta()).abs() < 1e-12);
    }
}
