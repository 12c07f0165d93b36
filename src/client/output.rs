use crate::client::measurement::Sample;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CSV_HEADER: &str = "seq_num,packet_size,one_way_latency_us,rtt_us,server_processing_us";

/// Per-packet CSV output, one row per completed exchange
pub struct CsvWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvWriter {
    /// Create (truncate) `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            Error::Output(format!("Failed to open output file {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER).map_err(|e| Self::write_error(path, e))?;
        debug!(path = %path.display(), "CSV output opened");
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        writeln!(
            self.writer,
            "{},{},{:.3},{:.3},{:.3}",
            sample.sequence.0,
            sample.packet_size,
            sample.one_way_latency_us,
            sample.rtt_us,
            sample.server_processing_us
        )
        .map_err(|e| Self::write_error(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush buffered rows and return the file path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer
            .flush()
            .map_err(|e| Self::write_error(&self.path, e))?;
        info!(path = %self.path.display(), rows = self.rows, "Results saved");
        Ok(self.path)
    }

    fn write_error(path: &Path, e: std::io::Error) -> Error {
        Error::Output(format!("Failed to write {}: {}", path.display(), e))
    }
}
