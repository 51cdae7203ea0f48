//! Daily log files.
//!
//! One append-only file per UTC date, `YYYY-MM-DD.jsonl`. Each write
//! checks the date and reopens when it has moved on, so a long-running
//! process rotates at midnight without a background task.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// File name holding the logs of `date`.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{}.jsonl", date.format("%Y-%m-%d"))
}

struct DailyFile {
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// Line-flushed writer over the current day's log file.
#[derive(Clone)]
pub struct DailyLogWriter {
    dir: PathBuf,
    current: Arc<Mutex<DailyFile>>,
}

impl DailyLogWriter {
    /// Create `dir` if needed and open today's file for appending.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let today = Utc::now().date_naive();
        let file = open_day(&dir, today)?;
        Ok(Self {
            dir,
            current: Arc::new(Mutex::new(file)),
        })
    }

    /// Path of the file currently written to.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(log_file_name(self.current.lock().date))
    }

    /// Write `buf` into the file for `date`, switching files if needed.
    pub(crate) fn write_on(&self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut current = self.current.lock();
        if current.date != date {
            current.writer.flush()?;
            *current = open_day(&self.dir, date)?;
        }
        let n = current.writer.write(buf)?;
        // Flush per line so `tail -f` sees complete entries.
        current.writer.flush()?;
        Ok(n)
    }
}

fn open_day(dir: &Path, date: NaiveDate) -> io::Result<DailyFile> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(log_file_name(date)))?;
    Ok(DailyFile {
        date,
        writer: BufWriter::with_capacity(8192, file),
    })
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(Utc::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current.lock().writer.flush()
    }
}

impl<'a> MakeWriter<'a> for DailyLogWriter {
    type Writer = DailyLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
