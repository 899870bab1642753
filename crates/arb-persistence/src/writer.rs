//! JSON Lines trade history writer.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Files rotate daily (`trades_YYYY-MM-DD.jsonl`)

use crate::error::PersistenceResult;
use arb_core::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::{debug, info, warn};

/// One closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size_notional: Decimal,
    pub leverage: u32,
    pub adds_done: u32,
    pub pnl_pct: Decimal,
    pub pnl_usd: Decimal,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only JSON Lines writer for closed trades.
pub struct TradeHistoryWriter {
    /// Base directory for output files.
    base_dir: String,
    /// Buffer of pending records.
    buffer: Vec<TradeRecord>,
    /// Maximum buffer size before flush.
    max_buffer_size: usize,
    /// Active writer (open until date rotation).
    active_writer: Option<ActiveWriter>,
}

impl TradeHistoryWriter {
    /// Create a new writer. Trades are infrequent, so a buffer of 1
    /// writes every record through immediately.
    pub fn new(base_dir: &str, max_buffer_size: usize) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }

        Self {
            base_dir: base_dir.to_string(),
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        }
    }

    /// Add a trade record to the buffer.
    pub fn add_record(&mut self, record: TradeRecord) -> PersistenceResult<()> {
        self.buffer.push(record);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    fn close_active_writer(&mut self) -> PersistenceResult<()> {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade history writer"
            );
        }
        Ok(())
    }

    fn open_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let filename = format!("{}/trades_{}.jsonl", self.base_dir, date);
        info!(filename = %filename, "Opening trade history writer (append mode)");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    /// Flush buffer to the current day's file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer()?;
        }

        if self.active_writer.is_none() {
            self.open_writer(&today)?;
        }
        let Some(active) = self.active_writer.as_mut() else {
            return Ok(());
        };
        let records = std::mem::take(&mut self.buffer);

        for record in &records {
            let json = serde_json::to_string(record)?;
            writeln!(active.writer, "{}", json)?;
        }
        active.writer.flush()?;
        active.records_written += records.len();

        debug!(date = %today, records = records.len(), "Flushed trades to JSON Lines");
        Ok(())
    }

    /// Close the writer, flushing any pending data.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer()
    }
}

impl Drop for TradeHistoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush buffer on drop");
        }
        if let Err(e) = self.close_active_writer() {
            warn!(?e, "Failed to close writer on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;

    fn make_test_record(symbol: &str) -> TradeRecord {
        TradeRecord {
            symbol: symbol.to_string(),
            side: Side::Long,
            entry_price: dec!(1.00),
            exit_price: dec!(1.03),
            size_notional: dec!(10),
            leverage: 10,
            adds_done: 0,
            pnl_pct: dec!(30),
            pnl_usd: dec!(3),
            reason: "take_profit".to_string(),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    fn read_lines(dir: &TempDir) -> Vec<String> {
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        let file = File::open(entries[0].path()).unwrap();
        BufReader::new(file).lines().filter_map(|l| l.ok()).collect()
    }

    #[test]
    fn test_write_through_with_unit_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = TradeHistoryWriter::new(temp_dir.path().to_str().unwrap(), 1);

        writer.add_record(make_test_record("FOO")).unwrap();
        writer.add_record(make_test_record("BAR")).unwrap();

        let lines = read_lines(&temp_dir);
        assert_eq!(lines.len(), 2);
        let record: TradeRecord = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(record.symbol, "BAR");
        assert_eq!(record.pnl_pct, dec!(30));
    }

    #[test]
    fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut writer = TradeHistoryWriter::new(temp_dir.path().to_str().unwrap(), 10);
            writer.add_record(make_test_record("A")).unwrap();
            writer.close().unwrap();
        }
        {
            let mut writer = TradeHistoryWriter::new(temp_dir.path().to_str().unwrap(), 10);
            writer.add_record(make_test_record("B")).unwrap();
            // Dropped without close: Drop flushes
        }

        assert_eq!(read_lines(&temp_dir).len(), 2);
    }

    #[test]
    fn test_empty_flush_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = TradeHistoryWriter::new(temp_dir.path().to_str().unwrap(), 10);

        writer.flush().unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }
}
