//! Append-only reading log.
//!
//! One comma-separated line per reading after a fixed header row. The log
//! is only ever appended to; concurrent readers see whole lines or nothing
//! new. Appends are serialized by the sampling engine, not here.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::reading::{Provenance, Rating, Reading};

/// Header row, written once when the file is created or found empty.
pub const HEADER: [&str; 8] = [
    "timestamp",
    "temp_c",
    "humidity",
    "eco2_ppm",
    "tvoc_ppb",
    "raw_index",
    "rating",
    "provenance",
];

/// Reading log failures.
#[derive(Error, Debug)]
pub enum LogError {
    /// Filesystem access failed.
    #[error("Reading log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line that does not hold a reading.
    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Handle to the reading log file.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    path: PathBuf,
}

impl ReadingLog {
    /// Opens the log, creating its directory and header row if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let log = Self {
            path: path.as_ref().to_path_buf(),
        };
        log.ensure_header()?;
        Ok(log)
    }

    /// Returns the log path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn ensure_header(&self) -> Result<(), LogError> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(self.io_err(e)),
        };
        if !needs_header {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        fs::write(&self.path, format!("{}\n", HEADER.join(","))).map_err(|e| self.io_err(e))?;
        info!("Created reading log at {}", self.path.display());
        Ok(())
    }

    /// Appends one reading.
    pub fn append(&self, reading: &Reading) -> Result<(), LogError> {
        self.ensure_header()?;

        let line = format_record(reading);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        // Single write so a concurrent reader never sees half a record
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_err(e))?;

        debug!("Logged reading: {}", line.trim_end());
        Ok(())
    }

    /// Returns the most recent well-formed reading, skipping damaged lines.
    ///
    /// A missing or empty file is "no data", not an error.
    pub fn last(&self) -> Result<Option<Reading>, LogError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        let lines: Vec<&str> = content.lines().collect();
        for line in lines.iter().skip(1).rev() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(line) {
                Ok(reading) => return Ok(Some(reading)),
                Err(e) => debug!("Skipping damaged log line: {}", e),
            }
        }
        Ok(None)
    }

    /// Counts well-formed readings.
    pub fn count(&self) -> Result<usize, LogError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_err(e)),
        };

        Ok(content
            .lines()
            .skip(1)
            .filter(|line| parse_record(line).is_ok())
            .count())
    }
}

/// Serializes a reading as one log line, newline included.
pub fn format_record(reading: &Reading) -> String {
    format!(
        "{},{:.2},{:.2},{},{},{},{},{}\n",
        reading.timestamp_iso(),
        reading.temperature_c,
        reading.humidity,
        reading.eco2_ppm,
        reading.tvoc_ppb,
        reading.aqi,
        reading.rating,
        reading.provenance,
    )
}

/// Parses one log line. Integer columns also accept float text ("500.0").
pub fn parse_record(line: &str) -> Result<Reading, LogError> {
    let malformed = |what: &str| LogError::Malformed(format!("{} in {:?}", what, line));

    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if fields.len() < HEADER.len() {
        return Err(malformed("too few fields"));
    }

    let timestamp = chrono::DateTime::parse_from_rfc3339(fields[0].trim())
        .map_err(|_| malformed("bad timestamp"))?;
    let temperature_c = fields[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed("bad temperature"))?;
    let humidity = fields[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed("bad humidity"))?;
    let eco2_ppm = parse_count(fields[3]).ok_or_else(|| malformed("bad eCO2"))?;
    let tvoc_ppb = parse_count(fields[4]).ok_or_else(|| malformed("bad TVOC"))?;
    let aqi = parse_count(fields[5])
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| malformed("bad index"))?;
    let provenance = fields[7]
        .parse::<Provenance>()
        .map_err(|_| malformed("bad provenance"))?;

    Ok(Reading {
        timestamp,
        temperature_c,
        humidity,
        eco2_ppm,
        tvoc_ppb,
        aqi,
        rating: Rating::from_index(aqi),
        provenance,
    })
}

fn parse_count(field: &str) -> Option<u16> {
    let field = field.trim();
    if let Ok(value) = field.parse::<u16>() {
        return Some(value);
    }
    let value = field.parse::<f64>().ok()?;
    if value.is_finite() && (0.0..=u16::MAX as f64).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}
