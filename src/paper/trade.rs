use chrono::NaiveDate;
use uuid::Uuid;

/// One execution. Never modified after booking.
///
/// `quantity` is signed: positive buys, negative sells. `theoretical` is the
/// model value per unit at execution time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub day: NaiveDate,
    pub instrument: String,
    pub quantity: f64,
    pub price: f64,
    pub theoretical: f64,
    pub commission: Option<f64>,
}

impl Trade {
    pub fn new(day: NaiveDate, instrument: impl Into<String>, quantity: f64, price: f64, theoretical: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            day,
            instrument: instrument.into(),
            quantity,
            price,
            theoretical,
            commission: None,
        }
    }

    pub fn with_commission(self, commission: f64) -> Self {
        Self {
            commission: Some(commission),
            ..self
        }
    }

    #[inline]
    pub fn commission(&self) -> f64 {
        self.commission.unwrap_or(0.0)
    }

    /// Cash paid, commission included. Negative for sales.
    #[inline]
    pub fn cost(&self) -> f64 {
        self.quantity * self.price + self.commission()
    }

    /// Model value captured at execution, before commission.
    #[inline]
    pub fn theoretical_edge(&self) -> f64 {
        self.quantity * (self.theoretical - self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_cost_includes_commission() {
        let t = Trade::new(day(), "SPX", 10.0, 5.0, 5.5).with_commission(1.25);
        assert_eq!(t.cost(), 51.25);
        assert_eq!(Trade::new(day(), "SPX", -2.0, 5.0, 5.5).cost(), -10.0);
    }

    #[test]
    fn test_theoretical_edge_sign() {
        let buy = Trade::new(day(), "SPX", 10.0, 5.0, 5.5);
        let sell = Trade::new(day(), "SPX", -10.0, 5.0, 5.5);
        assert!((buy.theoretical_edge() - 5.0).abs() < 1e-12);
        assert!((sell.theoretical_edge() + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Trade::new(day(), "A", 1.0, 1.0, 1.0).id, Trade::new(day(), "A", 1.0, 1.0, 1.0).id);
    }
}
