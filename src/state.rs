use chrono::NaiveDate;

// ── Plain records shared with out-of-core collaborators ──

/// One observed or simulated price on a trading day.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceRecord {
    pub day: NaiveDate,
    pub price: f64,
}

impl PriceRecord {
    #[inline]
    pub fn new(day: NaiveDate, price: f64) -> Self {
        Self { day, price }
    }
}

/// Flatten a path into its prices, keeping day order.
pub fn prices_of(path: &[PriceRecord]) -> Vec<f64> {
    path.iter().map(|r| r.price).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// +1 for calls, -1 for puts.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Call => 1.0,
            Self::Put => -1.0,
        }
    }
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}
