//! The daily attendance log: `<dir>/<YYYY-MM-DD>.csv`, one `name,HH:MM:SS`
//! row per student, no header.

use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("attendance log {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("attendance log {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
}

/// A row already present in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub time: String,
}

/// Destination for attendance records.
pub trait AttendanceLog {
    fn record(&mut self, name: &str, time: &str) -> Result<(), LedgerError>;
}

/// Append-only CSV log for one day.
pub struct Ledger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl Ledger {
    pub fn path_for(dir: &Path, date: NaiveDate) -> PathBuf {
        dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Open (creating if needed) the log for `date`, returning the rows it
    /// already holds so a restarted session can carry on.
    pub fn open(dir: &Path, date: NaiveDate) -> Result<(Self, Vec<Entry>), LedgerError> {
        std::fs::create_dir_all(dir).map_err(|source| LedgerError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = Self::path_for(dir, date);
        let existing = if path.exists() { read_entries(&path)? } else { Vec::new() };

        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        terminate_last_row(&mut file).map_err(io_err)?;
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        tracing::info!(path = %path.display(), resumed = existing.len(), "attendance log open");
        Ok((Self { path, writer }, existing))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AttendanceLog for Ledger {
    fn record(&mut self, name: &str, time: &str) -> Result<(), LedgerError> {
        let csv_err = |source| LedgerError::Csv {
            path: self.path.clone(),
            source,
        };
        self.writer.write_record([name, time]).map_err(csv_err)?;
        self.writer.flush().map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// A file whose last row lacks its newline would swallow the next record.
fn terminate_last_row(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<Entry>, LedgerError> {
    let csv_err = |source| LedgerError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut entries = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        match (row.get(0), row.get(1)) {
            (Some(name), time) if !name.trim().is_empty() => entries.push(Entry {
                name: name.trim().to_string(),
                time: time.unwrap_or("").trim().to_string(),
            }),
            _ => tracing::warn!(path = %path.display(), row = ?row, "skipping malformed log row"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn test_path_uses_iso_date() {
        assert_eq!(
            Ledger::path_for(Path::new("/var/att"), day()),
            PathBuf::from("/var/att/2024-03-07.csv")
        );
    }

    #[test]
    fn test_rows_are_written_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, existing) = Ledger::open(dir.path(), day()).unwrap();
        assert!(existing.is_empty());
        ledger.record("Ada Lovelace", "09:01:02").unwrap();
        ledger.record("Smith, Jo", "09:03:00").unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "Ada Lovelace,09:01:02\n\"Smith, Jo\",09:03:00\n");
    }

    #[test]
    fn test_reopen_resumes_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (mut ledger, _) = Ledger::open(dir.path(), day()).unwrap();
            ledger.record("Ada", "09:00:00").unwrap();
        }
        let (mut ledger, existing) = Ledger::open(dir.path(), day()).unwrap();
        assert_eq!(
            existing,
            vec![Entry {
                name: "Ada".into(),
                time: "09:00:00".into()
            }]
        );
        ledger.record("Grace", "09:10:00").unwrap();
        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_resume_after_unterminated_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = Ledger::path_for(dir.path(), day());
        std::fs::write(&path, "Ada,09:00:00").unwrap();
        {
            let (mut ledger, existing) = Ledger::open(dir.path(), day()).unwrap();
            assert_eq!(existing.len(), 1);
            ledger.record("Grace", "09:10:00").unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Ada,09:00:00\nGrace,09:10:00\n"
        );

        let (_, existing) = Ledger::open(dir.path(), day()).unwrap();
        assert_eq!(
            existing,
            vec![
                Entry {
                    name: "Ada".into(),
                    time: "09:00:00".into()
                },
                Entry {
                    name: "Grace".into(),
                    time: "09:10:00".into()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Ledger::path_for(dir.path(), day()), ",09:00:00\nGrace\n").unwrap();
        let (_, existing) = Ledger::open(dir.path(), day()).unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].name, "Grace");
        assert_eq!(existing[0].time, "");
    }
}
