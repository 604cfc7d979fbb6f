//! Per-cycle CSV log.
//!
//! One row per completed control cycle:
//!
//! ```text
//! timestamp,state,pwm,H,RSI,POP,FLOW,ME_ring
//! 2026-03-02T14:07:31.204+01:00,EVALUATING,34.50,0.7200,0.8000,0.9000,0.6000,0.1000
//! ```
//!
//! The column layout is parsed by offline analysis tools and must not
//! change.  Rows are flushed as they are written so a crash loses at most
//! the row in flight.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use log::{info, warn};

use crate::app::events::{AppEvent, CycleRecord};
use crate::app::ports::EventSink;

pub const CSV_HEADER: &str = "timestamp,state,pwm,H,RSI,POP,FLOW,ME_ring";

/// Placeholder in `logging.csv_output.file_path` replaced by `YYYYMMDD`.
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Expand [`DATE_PLACEHOLDER`] with the local date of `at`.
pub fn expand_path(template: &str, at: DateTime<Local>) -> PathBuf {
    PathBuf::from(template.replace(DATE_PLACEHOLDER, &at.format("%Y%m%d").to_string()))
}

/// Render one row (without newline).
pub fn format_row(at: DateTime<Local>, c: &CycleRecord) -> String {
    format!(
        "{},{},{:.2},{:.4},{:.4},{:.4},{:.4},{:.4}",
        at.to_rfc3339_opts(SecondsFormat::Millis, false),
        c.state,
        c.pwm,
        c.h,
        c.features.rsi,
        c.features.pop,
        c.features.flow,
        c.features.me_ring(),
    )
}

pub struct CsvCycleLog<W: Write> {
    out: W,
    rows: u64,
    /// Set after the first write error so a full disk logs once.
    failed: bool,
}

impl CsvCycleLog<BufWriter<File>> {
    /// Create the log at `template` (with `{date}` expanded), creating
    /// parent directories as needed.
    pub fn create(template: &str) -> io::Result<Self> {
        let path = expand_path(template, Local::now());
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let log = Self::new(BufWriter::new(File::create(&path)?))?;
        info!("cycle log: {}", path.display());
        Ok(log)
    }

    pub fn open_path(path: &Path) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> CsvCycleLog<W> {
    /// Wrap `out` and write the header line.
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{CSV_HEADER}")?;
        out.flush()?;
        Ok(Self {
            out,
            rows: 0,
            failed: false,
        })
    }

    pub fn write_record(&mut self, at: DateTime<Local>, record: &CycleRecord) -> io::Result<()> {
        writeln!(self.out, "{}", format_row(at, record))?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for CsvCycleLog<W> {
    fn emit(&mut self, event: &AppEvent) {
        let AppEvent::Cycle(record) = event else {
            return;
        };
        if let Err(e) = self.write_record(Local::now(), record) {
            if !self.failed {
                warn!("cycle log write failed: {e}");
            }
            self.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::features::FeatureVector;
    use crate::fsm::StateId;

    fn record() -> CycleRecord {
        CycleRecord {
            state: StateId::Evaluating,
            pwm: 34.5,
            h: 0.72,
            features: FeatureVector {
                me: 0.1,
                rsi: 0.8,
                pop: 0.9,
                flow: 0.6,
            },
        }
    }

    #[test]
    fn header_then_rows() {
        let mut log = CsvCycleLog::new(Vec::new()).unwrap();
        log.emit(&AppEvent::Cycle(record()));
        log.emit(&AppEvent::AnomalyCleared);
        log.emit(&AppEvent::Cycle(record()));
        assert_eq!(log.rows(), 2);

        let text = String::from_utf8(log.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        let cols: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cols.len(), 8);
        assert_eq!(
            &cols[1..],
            &["EVALUATING", "34.50", "0.7200", "0.8000", "0.9000", "0.6000", "0.1000"]
        );
        assert!(DateTime::parse_from_rfc3339(cols[0]).is_ok());
    }

    #[test]
    fn date_placeholder_expands() {
        let at = Local.with_ymd_and_hms(2026, 3, 2, 14, 7, 31).unwrap();
        assert_eq!(
            expand_path("logs/feeding_log_{date}.csv", at),
            PathBuf::from("logs/feeding_log_20260302.csv")
        );
        assert_eq!(expand_path("plain.csv", at), PathBuf::from("plain.csv"));
    }

    #[test]
    fn create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("nested/run_{date}.csv");
        let mut log = CsvCycleLog::create(template.to_str().unwrap()).unwrap();
        log.emit(&AppEvent::Cycle(record()));

        let written = fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(written, 1);
    }
}
