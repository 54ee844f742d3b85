// Output module - renders and writes trapper ingestion lines
//
// This module is responsible for:
// 1. Formatting one comparison result as a single ingestion line
// 2. Appending lines to an already-open byte-stream sink
// 3. Keeping the line contract stable for the downstream collector

use std::io::Write;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while writing output lines
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write output line: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders one comparison result as an ingestion line
///
/// Contract (whitespace-significant, newline-terminated):
///
/// ```text
/// "<hostName>" <itemKey><postfix> <epochSeconds> <deviation>
/// ```
///
/// The host name is quoted verbatim; embedded double quotes are not escaped
/// (a known limitation of the line format). The deviation uses fixed
/// six-decimal rendering so output is byte-stable across runs.
pub fn format_line(host: &str, key: &str, postfix: &str, clock: i64, deviation: f64) -> String {
    format!("\"{host}\" {key}{postfix} {clock} {deviation:.6}\n")
}

/// Appends ingestion lines to a byte-stream sink
///
/// The sink (stdout or a file) is opened and closed by the caller; this
/// writer only appends whole lines and flushes. All writes happen from the
/// single pipeline task, so lines never interleave.
pub struct LineWriter {
    sink: Box<dyn Write + Send>,
    lines: usize,
}

impl LineWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        LineWriter { sink, lines: 0 }
    }

    /// Writes one pre-formatted line
    pub fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        self.sink.write_all(line.as_bytes())?;
        self.lines += 1;
        debug!("Wrote output line #{}: {}", self.lines, line.trim_end());
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.sink.flush()?;
        Ok(())
    }
}
