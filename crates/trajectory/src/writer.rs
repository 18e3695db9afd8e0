//! Writes problem logs to a pretty-printed JSON trace file.

use crate::types::ProblemLog;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Buffers problem logs and rewrites the whole JSON array on every flush,
/// so a partially completed batch always leaves a readable file behind.
pub struct TraceWriter {
    logs: Vec<ProblemLog>,
    output_path: PathBuf,
}

impl TraceWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            logs: Vec::new(),
            output_path,
        }
    }

    /// Output path of the trace file.
    pub fn path(&self) -> &Path {
        &self.output_path
    }

    /// Buffer a single problem log.
    pub fn record(&mut self, log: ProblemLog) {
        self.logs.push(log);
    }

    /// Buffered logs in insertion order.
    pub fn logs(&self) -> &[ProblemLog] {
        &self.logs
    }

    /// Number of buffered logs.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Rewrite the trace file with every log buffered so far.
    pub fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.output_path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.logs)?;
        tracing::debug!(
            count = self.logs.len(),
            path = %self.output_path.display(),
            "Flushed trace log"
        );
        Ok(())
    }

    /// Write all buffered logs and return the output path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        self.flush()?;
        tracing::info!(
            count = self.logs.len(),
            path = %self.output_path.display(),
            "Wrote trace log"
        );
        Ok(self.output_path)
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunStats, SolveMethod, TestOutcome, Trace};

    fn make_log(problem: &str) -> ProblemLog {
        ProblemLog {
            problem: problem.to_string(),
            input: "1 2 3 4".to_string(),
            method: SolveMethod::Naive,
            outputs: vec!["(1+2+3)*4".to_string()],
            results: vec![TestOutcome::pass()],
            iterations: 0,
            error: None,
            trace: Trace::default(),
            stats: RunStats::default(),
            timestamp_ms: now_ms(),
        }
    }

    #[test]
    fn test_write_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.json");
        let writer = TraceWriter::new(path.clone());
        assert!(writer.is_empty());
        writer.finish().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "[]");
    }

    #[test]
    fn test_flush_rewrites_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("run.json");
        let mut writer = TraceWriter::new(path.clone());

        writer.record(make_log("p0"));
        writer.flush().unwrap();
        let first: Vec<ProblemLog> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(first.len(), 1);

        writer.record(make_log("p1"));
        writer.flush().unwrap();
        let second: Vec<ProblemLog> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].problem, "p1");
    }

    #[test]
    fn test_now_ms_is_nonzero() {
        assert!(now_ms() > 0);
    }
}
