use crate::errors::{QuantError, QuantResult};
use std::path::PathBuf;

/// Lower bracket of the implied-volatility search (0.1%).
pub const MIN_VOLATILITY: f64 = 0.001;
/// Upper bracket of the implied-volatility search (1000%).
pub const MAX_VOLATILITY: f64 = 10.0;
/// Simulated prices never go below this floor.
pub const MIN_PRICE: f64 = 0.01;
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Fraction of samples dropped from each tail in tail-probability mode.
pub const OUTLIER_PROBABILITY: f64 = 0.01;
/// Interquartile multiplier. 2.0 fits normal samples better than the classic 1.5.
pub const IQR_FACTOR: f64 = 2.0;
pub const SKEW_IQR_FACTOR: f64 = 1.5;
/// Median absolute deviation to normal-equivalent deviation.
pub const MAD_SCALE: f64 = 1.4826022185056023;
/// Winsorizing is skipped below this many samples.
pub const MIN_FILTER_SAMPLES: usize = 10;
pub const MIN_SKEW_SAMPLES: usize = 64;
pub const MONTE_CARLO_STEPS: usize = 10_000;
/// Relative spot bump for finite-difference delta.
pub const MONTE_CARLO_DELTA_BUMP: f64 = 0.01;
pub const IMPLIED_TOLERANCE: f64 = 1e-8;
pub const RATE_SEARCH_STEPS: usize = 60;
/// Total variance below this is treated as zero.
pub const EPSILON: f64 = 1e-12;

/// How the distribution fitter decides which samples are outliers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMode {
    /// Bounds at `Q1 - factor*IQR` and `Q3 + factor*IQR`.
    Interquartile { factor: f64 },
    /// Bounds at the sorted samples at positions round(n*p) and
    /// round(n*(1-p)), the upper one clamped to n-1. Samples equal to a bound
    /// are inliers, so the upper tail can lose one sample fewer than the
    /// lower one (n=10, p=0.1 trims nothing from the top).
    TailProbability { probability: f64 },
}

impl Default for OutlierMode {
    fn default() -> Self {
        OutlierMode::Interquartile { factor: IQR_FACTOR }
    }
}

/// Numeric tunables for the analytics core.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsConfig {
    pub min_volatility: f64,
    pub max_volatility: f64,
    pub min_price: f64,
    pub trading_days_per_year: f64,
    pub outlier_probability: f64,
    pub iqr_factor: f64,
    pub monte_carlo_steps: usize,
    pub outlier_mode: OutlierMode,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            min_volatility: MIN_VOLATILITY,
            max_volatility: MAX_VOLATILITY,
            min_price: MIN_PRICE,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
            outlier_probability: OUTLIER_PROBABILITY,
            iqr_factor: IQR_FACTOR,
            monte_carlo_steps: MONTE_CARLO_STEPS,
            outlier_mode: OutlierMode::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> QuantResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let min_volatility = parse_or("QF_MIN_VOLATILITY", defaults.min_volatility)?;
        let max_volatility = parse_or("QF_MAX_VOLATILITY", defaults.max_volatility)?;
        let outlier_probability = parse_or("QF_OUTLIER_PROBABILITY", defaults.outlier_probability)?;
        let iqr_factor = parse_or("QF_IQR_FACTOR", defaults.iqr_factor)?;

        let outlier_mode = match env_var_or("QF_OUTLIER_MODE", "interquartile").as_str() {
            "interquartile" | "iqr" => OutlierMode::Interquartile { factor: iqr_factor },
            "probability" | "tail" => OutlierMode::TailProbability {
                probability: outlier_probability,
            },
            other => {
                return Err(QuantError::Config(format!("QF_OUTLIER_MODE: unknown mode {other}")))
            }
        };

        let cfg = Self {
            min_volatility,
            max_volatility,
            min_price: parse_or("QF_MIN_PRICE", defaults.min_price)?,
            trading_days_per_year: parse_or("QF_TRADING_DAYS", defaults.trading_days_per_year)?,
            outlier_probability,
            iqr_factor,
            monte_carlo_steps: parse_or("QF_MONTE_CARLO_STEPS", defaults.monte_carlo_steps)?,
            outlier_mode,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject tunables the analytics cannot work with. NaN fails every check.
    pub fn validate(&self) -> QuantResult<()> {
        if !(self.min_volatility > 0.0 && self.max_volatility > self.min_volatility) {
            return Err(QuantError::Config(format!(
                "volatility bounds must satisfy 0 < min < max, got [{}, {}]",
                self.min_volatility, self.max_volatility
            )));
        }
        if !(self.iqr_factor >= 0.0 && self.iqr_factor.is_finite()) {
            return Err(QuantError::Config(format!(
                "QF_IQR_FACTOR must be finite and non-negative, got {}",
                self.iqr_factor
            )));
        }
        if !(self.outlier_probability >= 0.0 && self.outlier_probability < 0.5) {
            return Err(QuantError::Config(format!(
                "QF_OUTLIER_PROBABILITY must be in [0, 0.5), got {}",
                self.outlier_probability
            )));
        }
        if !(self.trading_days_per_year > 0.0 && self.trading_days_per_year.is_finite()) {
            return Err(QuantError::Config(format!(
                "QF_TRADING_DAYS must be positive, got {}",
                self.trading_days_per_year
            )));
        }
        if self.min_price.is_nan() || self.min_price < 0.0 {
            return Err(QuantError::Config(format!("QF_MIN_PRICE must be non-negative, got {}", self.min_price)));
        }
        Ok(())
    }
}

/// Settings for the backtest driver binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub analytics: AnalyticsConfig,
    pub instrument: String,
    pub workers: usize,
    pub seed: u64,
    pub spot: f64,
    pub history_days: i64,
    pub growth: f64,
    pub volatility: f64,
    pub rate: f64,
    pub option_days: usize,
    pub hedge_interval: usize,
    pub price_db_path: Option<PathBuf>,
    pub histogram_csv_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> QuantResult<Self> {
        dotenvy::dotenv().ok();

        let workers = parse_or("WORKERS", 4usize)?;
        if workers == 0 {
            return Err(QuantError::Config("WORKERS must be at least 1".to_string()));
        }

        Ok(Self {
            analytics: AnalyticsConfig::from_env()?,
            instrument: env_var_or("INSTRUMENT", "SYNTH"),
            workers,
            seed: parse_or("SEED", 42u64)?,
            spot: parse_or("SPOT", 100.0)?,
            history_days: parse_or("HISTORY_DAYS", 730i64)?,
            growth: parse_or("GROWTH", 0.05)?,
            volatility: parse_or("VOLATILITY", 0.25)?,
            rate: parse_or("RATE", 0.02)?,
            option_days: parse_or("OPTION_DAYS", 63usize)?.max(1),
            hedge_interval: parse_or("HEDGE_INTERVAL", 5usize)?.max(1),
            price_db_path: std::env::var("PRICE_DB_PATH").ok().map(PathBuf::from),
            histogram_csv_path: std::env::var("HISTOGRAM_CSV_PATH").ok().map(PathBuf::from),
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> QuantResult<T>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    env_var_or(key, &default.to_string())
        .parse::<T>()
        .map_err(|e| QuantError::Config(format!("{key}: {e}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
