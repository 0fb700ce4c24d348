use chrono::{Days, NaiveDate, Utc};
use quantfit::config::{AppConfig, EPSILON};
use quantfit::db::{self, DbPool, LoadPrices, StorePrices, StoreTrades};
use quantfit::errors::{QuantError, QuantResult};
use quantfit::math::quadrature::GaussLegendre;
use quantfit::models::black_scholes::BlackScholes;
use quantfit::models::monte_carlo::MonteCarloPricer;
use quantfit::models::normal_process::{next_trading_day, NormalProcess};
use quantfit::paper::strategy::Strategy;
use quantfit::paper::tracker;
use quantfit::paper::trade::Trade;
use quantfit::state::{OptionKind, PriceRecord};
use quantfit::stats::distribution::{log_returns, DistributionFitter};
use quantfit::stats::export;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::io::BufWriter;

const HISTOGRAM_BUCKETS: usize = 50;
const QUADRATURE_POINTS: usize = 16;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("quantfit backtest starting");

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cfg) {
        tracing::error!("backtest failed: {e}");
        std::process::exit(1);
    }

    tracing::info!("quantfit backtest finished");
}

fn run(cfg: &AppConfig) -> QuantResult<()> {
    let (history, db) = load_history(cfg)?;
    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        return Err(QuantError::InvalidInput(format!("no prices for {}", cfg.instrument)));
    };
    tracing::info!(
        instrument = %cfg.instrument,
        days = history.len(),
        "price history {} .. {}",
        first.day,
        last.day
    );

    // ── Fit ──

    let mut fitter = DistributionFitter::with_mode(cfg.analytics.outlier_mode);
    fitter.extend(log_returns(&history));
    fitter.compute(true);
    let medians = fitter.compute_medians();
    let skew = fitter.compute_skew();
    tracing::info!(
        summary = %serde_json::to_string(&fitter.summary())?,
        ?medians,
        ?skew,
        "return distribution fitted"
    );

    if let Some(path) = &cfg.histogram_csv_path {
        let buckets = fitter.histogram(HISTOGRAM_BUCKETS);
        let file = std::fs::File::create(path)?;
        export::write_xy(BufWriter::new(file), &export::histogram_points(&buckets))?;
        tracing::info!("histogram written to {}", path.display());
    }

    let dt = 1.0 / cfg.analytics.trading_days_per_year;
    let process = NormalProcess::parse_normal_process_with(&history, dt, true, cfg.analytics.outlier_probability)
        .ok_or_else(|| QuantError::InvalidInput("not enough returns to calibrate".to_string()))?;
    let volatility = process
        .volatility()
        .clamp(cfg.analytics.min_volatility, cfg.analytics.max_volatility);
    tracing::info!(growth = process.growth(), volatility, "normal process calibrated");

    // ── Price and trade ──

    let rule = GaussLegendre::new(QUADRATURE_POINTS)?;
    let rule = &rule;
    let spot = last.price;
    let start = last.day;

    let strategies = std::thread::scope(|s| {
        let handles: Vec<_> = (0..cfg.workers)
            .map(|worker| s.spawn(move || run_worker(worker, cfg, rule, process, volatility, spot, start)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(worker, h)| -> QuantResult<Strategy> {
                h.join()
                    .map_err(|_| QuantError::Worker(format!("worker {worker} panicked")))?
            })
            .collect::<QuantResult<Vec<_>>>()
    })?;

    let metrics = tracker::compute_aggregate(&strategies, &HashMap::new())?;
    tracing::info!(metrics = %serde_json::to_string(&metrics)?, "backtest metrics");

    if let Some(db) = &db {
        for strategy in &strategies {
            let stored = db::run(db, &mut StoreTrades::new(strategy.name(), strategy.trades().to_vec()))?;
            tracing::info!(strategy = strategy.name(), stored, "trades stored");
        }
    }

    Ok(())
}

/// Prices from the configured database, or a synthetic path when there is no
/// database or it holds nothing for the instrument yet.
fn load_history(cfg: &AppConfig) -> QuantResult<(Vec<PriceRecord>, Option<DbPool>)> {
    let Some(path) = &cfg.price_db_path else {
        return Ok((synthetic_history(cfg)?, None));
    };

    let db = db::init_db(path)?;
    let mut history = db::run(&db, &mut LoadPrices::new(cfg.instrument.as_str()))?;
    if history.is_empty() {
        history = synthetic_history(cfg)?;
        let stored = db::run(&db, &mut StorePrices::new(cfg.instrument.as_str(), history.clone()))?;
        tracing::info!(stored, "seeded synthetic price history");
    }
    Ok((history, Some(db)))
}

fn synthetic_history(cfg: &AppConfig) -> QuantResult<Vec<PriceRecord>> {
    let last_day = Utc::now().date_naive();
    let first_day = last_day
        .checked_sub_days(Days::new(cfg.history_days.max(1) as u64))
        .ok_or_else(|| QuantError::Config(format!("HISTORY_DAYS out of range: {}", cfg.history_days)))?;

    let process = NormalProcess::new(cfg.growth, cfg.volatility);
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    Ok(process.generate_path(
        &mut rng,
        PriceRecord::new(first_day, cfg.spot),
        last_day,
        1.0 / cfg.analytics.trading_days_per_year,
        cfg.analytics.min_price,
    ))
}

/// Buy one ATM call at the Black-Scholes price, delta-hedge it along a
/// simulated forward and settle at expiry.
fn run_worker(
    worker: usize,
    cfg: &AppConfig,
    rule: &GaussLegendre,
    process: NormalProcess,
    volatility: f64,
    spot: f64,
    start: NaiveDate,
) -> QuantResult<Strategy> {
    let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(worker as u64));
    let mut strategy = Strategy::new(format!("{}-hedged-call-{worker}", cfg.instrument));
    let dt = 1.0 / cfg.analytics.trading_days_per_year;
    let days = cfg.option_days;

    let Some(path) = process.generate_forward(&mut rng, spot, days, dt, cfg.analytics.min_price) else {
        tracing::warn!(worker, "forward path breached the price floor, nothing traded");
        return Ok(strategy);
    };

    let contract = BlackScholes::new(OptionKind::Call, spot, spot, days as f64 * dt, cfg.rate, 0.0, volatility);
    let mc = MonteCarloPricer::new(contract).with_steps(cfg.analytics.monte_carlo_steps);
    let market = contract.price();
    let theoretical = mc.price();
    tracing::debug!(
        worker,
        market,
        theoretical,
        quadrature = mc.integrated_price(rule),
        implied = ?contract.implied_volatility_within(theoretical, cfg.analytics.min_volatility, cfg.analytics.max_volatility),
        "option priced"
    );

    let option = format!("{}-C{:.2}", cfg.instrument, contract.strike());
    let mut day = start;
    strategy.add_trade(Trade::new(day, option.as_str(), 1.0, market, theoretical));

    let mut hedge = 0.0;
    for (i, &price) in path.iter().enumerate().take(days) {
        if i > 0 {
            day = advance(day)?;
        }
        if i % cfg.hedge_interval != 0 {
            continue;
        }
        let remaining = (days - i) as f64 * dt;
        let target = -contract.with_spot(price).with_time(remaining).delta();
        let quantity = target - hedge;
        if quantity.abs() > EPSILON {
            strategy.add_trade(Trade::new(day, cfg.instrument.as_str(), quantity, price, price));
            hedge = target;
        }
    }

    let expiry_day = advance(day)?;
    let final_price = path.last().copied().unwrap_or(spot);
    let payoff = contract.with_spot(final_price).value_at_expiration();
    strategy.add_trade(Trade::new(expiry_day, option.as_str(), -1.0, payoff, payoff));
    if hedge.abs() > EPSILON {
        strategy.add_trade(Trade::new(expiry_day, cfg.instrument.as_str(), -hedge, final_price, final_price));
    }

    tracing::debug!(worker, trades = strategy.trades().len(), final_price, "worker finished");
    Ok(strategy)
}

fn advance(day: NaiveDate) -> QuantResult<NaiveDate> {
    next_trading_day(day).ok_or_else(|| QuantError::InvalidInput(format!("no trading day after {day}")))
}
