//! CSV files: bid/ask candles and conversion rates for the backtracker, raw
//! ticks for the aggregator, and aggregated candles written back out.
//!
//! Times are RFC 3339 or integer Unix seconds. Malformed rows are logged and
//! skipped; a file with no usable row is `NoData`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use tracing::warn;

use crate::domain::candle::{Candle, HistoricalCandle, Heartbeat, MarketEvent, Tick};
use crate::domain::error::{BarbotError, ParseError};
use crate::domain::ledger::RateTable;

pub const CANDLE_HEADER: [&str; 8] = ["time", "open", "high", "low", "close", "volume", "bid", "ask"];

fn source_name(path: &Path) -> String {
    path.display().to_string()
}

pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn field<'a>(
    record: &'a StringRecord,
    index: usize,
    name: &str,
    source: &str,
    position: usize,
) -> Result<&'a str, ParseError> {
    record
        .get(index)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ParseError::new(source, position, format!("missing {name} column")))
}

fn number(
    record: &StringRecord,
    index: usize,
    name: &str,
    source: &str,
    position: usize,
) -> Result<f64, ParseError> {
    let raw = field(record, index, name, source, position)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::new(source, position, format!("invalid {name} value '{raw}'")))
}

fn time(record: &StringRecord, source: &str, position: usize) -> Result<DateTime<Utc>, ParseError> {
    let raw = field(record, 0, "time", source, position)?;
    parse_time(raw).ok_or_else(|| ParseError::new(source, position, format!("invalid time '{raw}'")))
}

/// `time,open,high,low,close,volume,bid,ask`.
pub fn parse_candle_record(
    record: &StringRecord,
    source: &str,
    position: usize,
) -> Result<HistoricalCandle, ParseError> {
    let candle = Candle {
        time: time(record, source, position)?,
        open: number(record, 1, "open", source, position)?,
        high: number(record, 2, "high", source, position)?,
        low: number(record, 3, "low", source, position)?,
        close: number(record, 4, "close", source, position)?,
        volume: number(record, 5, "volume", source, position)?,
    };
    if candle.low > candle.high {
        return Err(ParseError::new(source, position, "low above high"));
    }
    Ok(HistoricalCandle {
        candle,
        bid: number(record, 6, "bid", source, position)?,
        ask: number(record, 7, "ask", source, position)?,
    })
}

/// `time,price,volume`; a row without a price is a heartbeat.
pub fn parse_event_record(
    record: &StringRecord,
    source: &str,
    position: usize,
) -> Result<MarketEvent, ParseError> {
    let time = time(record, source, position)?;
    let has_price = record.get(1).is_some_and(|v| !v.trim().is_empty());
    if !has_price {
        return Ok(MarketEvent::Heartbeat(Heartbeat { time }));
    }
    let price = number(record, 1, "price", source, position)?;
    let volume = match record.get(2).map(str::trim) {
        Some(v) if !v.is_empty() => number(record, 2, "volume", source, position)?,
        _ => 0.0,
    };
    Ok(MarketEvent::Tick(Tick {
        time,
        price,
        volume,
    }))
}

/// One conversion rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub time: DateTime<Utc>,
    pub currency: String,
    pub rate: f64,
}

/// `time,currency,rate`; the rate is the price of one unit in the account currency.
pub fn parse_rate_record(
    record: &StringRecord,
    source: &str,
    position: usize,
) -> Result<RateRecord, ParseError> {
    let time = time(record, source, position)?;
    let currency = field(record, 1, "currency", source, position)?.to_ascii_uppercase();
    let rate = number(record, 2, "rate", source, position)?;
    if rate <= 0.0 {
        return Err(ParseError::new(source, position, "rate must be positive"));
    }
    Ok(RateRecord {
        time,
        currency,
        rate,
    })
}

fn read_records<T>(
    path: &Path,
    parse: impl Fn(&StringRecord, &str, usize) -> Result<T, ParseError>,
) -> Result<Vec<T>, BarbotError> {
    let source = source_name(path);
    let content = fs::read_to_string(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let position = i + 1;
        let parsed = result
            .map_err(|e| ParseError::new(&source, position, e.to_string()))
            .and_then(|record| parse(&record, &source, position));
        match parsed {
            Ok(row) => rows.push(row),
            Err(err) => warn!(error = %err, "row skipped"),
        }
    }
    if rows.is_empty() {
        return Err(BarbotError::NoData { instrument: source });
    }
    Ok(rows)
}

/// Historical candles sorted oldest-first.
pub fn read_candles<P: AsRef<Path>>(path: P) -> Result<Vec<HistoricalCandle>, BarbotError> {
    let mut candles = read_records(path.as_ref(), parse_candle_record)?;
    candles.sort_by_key(|c| c.candle.time);
    Ok(candles)
}

/// Market events in file order.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<MarketEvent>, BarbotError> {
    read_records(path.as_ref(), parse_event_record)
}

pub fn read_rates<P: AsRef<Path>>(path: P) -> Result<RateTable, BarbotError> {
    let mut table = RateTable::new();
    for row in read_records(path.as_ref(), parse_rate_record)? {
        table.insert(&row.currency, row.time, row.rate);
    }
    Ok(table)
}

/// Write candles oldest-first as `time,open,high,low,close,volume`.
pub fn write_candles<P: AsRef<Path>>(path: P, newest_first: &[Candle]) -> Result<(), BarbotError> {
    let path = path.as_ref();
    let to_io = |e: csv::Error| BarbotError::Io(std::io::Error::other(e));
    let mut writer = csv::Writer::from_path(path).map_err(to_io)?;
    writer.write_record(&CANDLE_HEADER[..6]).map_err(to_io)?;
    for candle in newest_first.iter().rev() {
        writer
            .write_record([
                candle.time.to_rfc3339(),
                candle.open.to_string(),
                candle.high.to_string(),
                candle.low.to_string(),
                candle.close.to_string(),
                candle.volume.to_string(),
            ])
            .map_err(to_io)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("EUR_USD.csv");
        let content = "time,open,high,low,close,volume,bid,ask\n\
            2024-01-15T10:05:00Z,1.1010,1.1030,1.1000,1.1020,40,1.10195,1.10205\n\
            2024-01-15T10:00:00Z,1.1000,1.1015,1.0990,1.1010,25,1.10095,1.10105\n\
            2024-01-15T10:10:00Z,oops,1.1030,1.1000,1.1020,40,1.1,1.1\n";
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn read_candles_sorts_and_skips_bad_rows() {
        let (_dir, path) = setup_test_data();
        let candles = read_candles(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[0].candle.time,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert!((candles[0].candle.close - 1.1010).abs() < f64::EPSILON);
        assert!((candles[1].ask - 1.10205).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = read_candles(dir.path().join("none.csv"));
        assert!(matches!(result, Err(BarbotError::Io(_))));
    }

    #[test]
    fn header_only_is_no_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "time,open,high,low,close,volume,bid,ask\n").unwrap();
        assert!(matches!(read_candles(&path), Err(BarbotError::NoData { .. })));
    }

    #[test]
    fn parse_record_reports_position() {
        let record = StringRecord::from(vec!["2024-01-15T10:00:00Z", "1.1", "1.0", "1.2", "1.1", "5", "1", "1"]);
        let err = parse_candle_record(&record, "x.csv", 7).unwrap_err();
        assert_eq!(err.position, 7);
        assert_eq!(err.message, "low above high");
    }

    #[test]
    fn events_with_heartbeats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ticks.csv");
        fs::write(
            &path,
            "time,price,volume\n1704067200,1.5,2\n1704067260,,\n1704067270,1.6,\n",
        )
        .unwrap();
        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], MarketEvent::Tick(t) if (t.volume - 2.0).abs() < f64::EPSILON));
        assert!(matches!(events[1], MarketEvent::Heartbeat(_)));
        assert!(matches!(events[2], MarketEvent::Tick(t) if t.volume.abs() < f64::EPSILON));
    }

    #[test]
    fn write_then_read_back_oldest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newest_first = vec![
            Candle::flat(t0 + chrono::Duration::minutes(1), 2.0, 1.0),
            Candle::flat(t0, 1.0, 3.0),
        ];
        write_candles(&path, &newest_first).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "time,open,high,low,close,volume");
        assert!(lines[1].starts_with("2024-01-01T00:00:00+00:00,1,1,1,1,3"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn rates_by_time_and_currency() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rates.csv");
        fs::write(
            &path,
            "time,currency,rate
             2024-01-01T00:00:00Z,usd,0.90
             2024-01-02T00:00:00Z,USD,0.92
             2024-01-02T00:00:00Z,JPY,-1
             2024-01-03T00:00:00Z,,0.5
",
        )
        .unwrap();
        let table = read_rates(&path).unwrap();
        assert_eq!(table.len(), 2);
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(table.rate_at("USD", Some(noon)), Some(0.90));
        assert_eq!(table.rate_at("USD", None), Some(0.92));
        assert_eq!(table.rate_at("JPY", None), None);
    }

    #[test]
    fn unix_and_rfc3339_times() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time("1704067200"), Some(expected));
        assert_eq!(parse_time("2024-01-01T01:00:00+01:00"), Some(expected));
        assert_eq!(parse_time("yesterday"), None);
    }
}
