use crate::errors::{QuantError, QuantResult};
use crate::paper::trade::Trade;
use crate::state::PriceRecord;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub type DbPool = Arc<Mutex<Connection>>;

const DAY_FORMAT: &str = "%Y-%m-%d";
const FIRST_DAY: &str = "0000-01-01";
const LAST_DAY: &str = "9999-12-31";

pub fn init_db(path: &Path) -> QuantResult<DbPool> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| QuantError::Database(format!("create dir: {e}")))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    migrate(&conn)?;

    tracing::info!("database initialized at {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn open_in_memory() -> QuantResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate(conn: &Connection) -> QuantResult<()> {
    let schema = include_str!("../migrations/001_init.sql");
    conn.execute_batch(schema)?;
    Ok(())
}

/// A unit of database work: prepare, run, release.
///
/// `cleanup` runs whether or not `execute_query` succeeded.
pub trait Procedure {
    type Output;

    fn name(&self) -> &'static str;

    fn init(&mut self, _conn: &Connection) -> QuantResult<()> {
        Ok(())
    }

    fn execute_query(&mut self, conn: &Connection) -> QuantResult<Self::Output>;

    fn cleanup(&mut self, _conn: &Connection) -> QuantResult<()> {
        Ok(())
    }
}

/// Run one procedure under the connection lock.
pub fn run<P: Procedure>(db: &DbPool, procedure: &mut P) -> QuantResult<P::Output> {
    let conn = db.lock().map_err(|e| QuantError::Database(format!("lock poisoned: {e}")))?;

    procedure.init(&conn)?;
    let result = procedure.execute_query(&conn);
    let cleaned = procedure.cleanup(&conn);
    match &result {
        Ok(_) => tracing::debug!(procedure = procedure.name(), "procedure complete"),
        Err(e) => tracing::error!(procedure = procedure.name(), "procedure failed: {e}"),
    }
    let output = result?;
    cleaned?;
    Ok(output)
}

fn parse_day(raw: &str) -> QuantResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DAY_FORMAT).map_err(|e| QuantError::Database(format!("bad day {raw:?}: {e}")))
}

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

// ── Transactions for the writers ──

fn begin(conn: &Connection) -> QuantResult<()> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    Ok(())
}

fn finish(conn: &Connection, committed: bool) -> QuantResult<()> {
    conn.execute_batch(if committed { "COMMIT" } else { "ROLLBACK" })?;
    Ok(())
}

// ── Prices ──

/// Daily prices for one instrument in day order, optionally bounded
/// (inclusive) on either side.
#[derive(Debug, Clone)]
pub struct LoadPrices {
    pub instrument: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl LoadPrices {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            from: None,
            to: None,
        }
    }

    pub fn between(self, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..self
        }
    }
}

impl Procedure for LoadPrices {
    type Output = Vec<PriceRecord>;

    fn name(&self) -> &'static str {
        "load_prices"
    }

    fn execute_query(&mut self, conn: &Connection) -> QuantResult<Self::Output> {
        let from = self.from.map(format_day).unwrap_or_else(|| FIRST_DAY.to_string());
        let to = self.to.map(format_day).unwrap_or_else(|| LAST_DAY.to_string());

        let mut stmt = conn.prepare(
            "SELECT day, price FROM prices WHERE instrument = ?1 AND day >= ?2 AND day <= ?3 ORDER BY day",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![self.instrument, from, to], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(day, price)| -> QuantResult<PriceRecord> { Ok(PriceRecord::new(parse_day(&day)?, price)) })
            .collect()
    }
}

/// Upsert a price history.
#[derive(Debug, Clone)]
pub struct StorePrices {
    pub instrument: String,
    pub records: Vec<PriceRecord>,
    committed: bool,
}

impl StorePrices {
    pub fn new(instrument: impl Into<String>, records: Vec<PriceRecord>) -> Self {
        Self {
            instrument: instrument.into(),
            records,
            committed: false,
        }
    }
}

impl Procedure for StorePrices {
    type Output = usize;

    fn name(&self) -> &'static str {
        "store_prices"
    }

    fn init(&mut self, conn: &Connection) -> QuantResult<()> {
        self.committed = false;
        begin(conn)
    }

    fn execute_query(&mut self, conn: &Connection) -> QuantResult<usize> {
        let mut stmt = conn.prepare("INSERT OR REPLACE INTO prices (instrument, day, price) VALUES (?1, ?2, ?3)")?;
        for r in &self.records {
            stmt.execute(rusqlite::params![self.instrument, format_day(r.day), r.price])?;
        }
        self.committed = true;
        Ok(self.records.len())
    }

    fn cleanup(&mut self, conn: &Connection) -> QuantResult<()> {
        finish(conn, self.committed)
    }
}

// ── Trades ──

/// Append a strategy's trades after any already stored for it.
#[derive(Debug, Clone)]
pub struct StoreTrades {
    pub strategy: String,
    pub trades: Vec<Trade>,
    committed: bool,
}

impl StoreTrades {
    pub fn new(strategy: impl Into<String>, trades: Vec<Trade>) -> Self {
        Self {
            strategy: strategy.into(),
            trades,
            committed: false,
        }
    }
}

impl Procedure for StoreTrades {
    type Output = usize;

    fn name(&self) -> &'static str {
        "store_trades"
    }

    fn init(&mut self, conn: &Connection) -> QuantResult<()> {
        self.committed = false;
        begin(conn)
    }

    fn execute_query(&mut self, conn: &Connection) -> QuantResult<usize> {
        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM trades WHERE strategy = ?1",
            rusqlite::params![self.strategy],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "INSERT INTO trades (id, strategy, day, instrument, quantity, price, theoretical, commission, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (i, t) in self.trades.iter().enumerate() {
            stmt.execute(rusqlite::params![
                t.id.to_string(),
                self.strategy,
                format_day(t.day),
                t.instrument,
                t.quantity,
                t.price,
                t.theoretical,
                t.commission,
                next_seq + i as i64,
            ])?;
        }
        self.committed = true;
        Ok(self.trades.len())
    }

    fn cleanup(&mut self, conn: &Connection) -> QuantResult<()> {
        finish(conn, self.committed)
    }
}

/// A strategy's trades in booking order.
#[derive(Debug, Clone)]
pub struct LoadTrades {
    pub strategy: String,
}

impl LoadTrades {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
        }
    }
}

struct TradeRow {
    id: String,
    day: String,
    instrument: String,
    quantity: f64,
    price: f64,
    theoretical: f64,
    commission: Option<f64>,
}

impl Procedure for LoadTrades {
    type Output = Vec<Trade>;

    fn name(&self) -> &'static str {
        "load_trades"
    }

    fn execute_query(&mut self, conn: &Connection) -> QuantResult<Self::Output> {
        let mut stmt = conn.prepare(
            "SELECT id, day, instrument, quantity, price, theoretical, commission FROM trades WHERE strategy = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![self.strategy], |row| {
                Ok(TradeRow {
                    id: row.get(0)?,
                    day: row.get(1)?,
                    instrument: row.get(2)?,
                    quantity: row.get(3)?,
                    price: row.get(4)?,
                    theoretical: row.get(5)?,
                    commission: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|r| -> QuantResult<Trade> {
                Ok(Trade {
                    id: Uuid::parse_str(&r.id).map_err(|e| QuantError::Database(format!("bad trade id {:?}: {e}", r.id)))?,
                    day: parse_day(&r.day)?,
                    instrument: r.instrument,
                    quantity: r.quantity,
                    price: r.price,
                    theoretical: r.theoretical,
                    commission: r.commission,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_prices_round_trip_in_day_order() {
        let db = open_in_memory().unwrap();
        let records = vec![
            PriceRecord::new(ymd(2024, 1, 3), 101.0),
            PriceRecord::new(ymd(2024, 1, 2), 100.0),
            PriceRecord::new(ymd(2024, 1, 4), 99.5),
        ];
        assert_eq!(run(&db, &mut StorePrices::new("ABC", records)).unwrap(), 3);
        run(&db, &mut StorePrices::new("XYZ", vec![PriceRecord::new(ymd(2024, 1, 2), 5.0)])).unwrap();

        let loaded = run(&db, &mut LoadPrices::new("ABC")).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0], PriceRecord::new(ymd(2024, 1, 2), 100.0));
        assert_eq!(loaded[2].price, 99.5);

        let window = run(&db, &mut LoadPrices::new("ABC").between(ymd(2024, 1, 3), ymd(2024, 1, 3))).unwrap();
        assert_eq!(window, vec![PriceRecord::new(ymd(2024, 1, 3), 101.0)]);

        assert!(run(&db, &mut LoadPrices::new("NONE")).unwrap().is_empty());
    }

    #[test]
    fn test_trades_append_in_booking_order() {
        let db = open_in_memory().unwrap();
        let first = vec![
            Trade::new(ymd(2024, 2, 1), "C", 1.0, 2.0, 2.1).with_commission(0.1),
            Trade::new(ymd(2024, 2, 2), "C", -1.0, 2.5, 2.4),
        ];
        let second = vec![Trade::new(ymd(2024, 1, 15), "P", 3.0, 1.0, 1.2)];

        run(&db, &mut StoreTrades::new("s", first.clone())).unwrap();
        run(&db, &mut StoreTrades::new("s", second.clone())).unwrap();
        // duplicate ids: the whole batch rolls back
        run(&db, &mut StoreTrades::new("other", second.clone())).unwrap_err();

        let loaded = run(&db, &mut LoadTrades::new("s")).unwrap();
        let expected: Vec<Trade> = first.into_iter().chain(second).collect();
        assert_eq!(loaded, expected);
        assert!(run(&db, &mut LoadTrades::new("other")).unwrap().is_empty());
    }
}
