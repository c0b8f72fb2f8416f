//! JSON Lines sink

use super::traits::{CrawlRecord, OutputResult, Sink};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes one JSON object per line
pub struct JsonlSink<W: Write + Send> {
    writer: BufWriter<W>,
    records_written: u64,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            records_written: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl JsonlSink<File> {
    /// Creates (or truncates) `path` and writes records to it
    pub fn create(path: &Path) -> OutputResult<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl JsonlSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Sink for JsonlSink<W> {
    fn record(&mut self, record: &CrawlRecord) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
