//! Run logging
//!
//! Each run owns its logger instance; nothing is global. Messages go to
//! stdout and, when a log file is configured, are appended there as well.

use crate::error::Result;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Dual-sink logger: console always, file when configured
pub struct RunLogger {
    file: Option<File>,
}

impl RunLogger {
    /// Console-only logger
    pub fn stdout_only() -> Self {
        Self { file: None }
    }

    /// Logger that also appends to the given file, creating parents as needed
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::header(&file)?;
        Ok(Self { file: Some(file) })
    }

    fn header(mut file: &File) -> Result<()> {
        writeln!(file, "==== run start ====")?;
        Ok(())
    }

    pub fn info(&mut self, msg: &str) {
        println!("{msg}");
        if let Some(file) = &mut self.file {
            // Console output already carried the message
            let _ = writeln!(file, "{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_appends() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("run.log");

        let mut logger = RunLogger::with_file(&path).expect("logger");
        logger.info("epoch 1 done");
        logger.info("epoch 2 done");

        let contents = fs::read_to_string(&path).expect("log file");
        assert!(contents.contains("epoch 1 done"));
        assert!(contents.contains("epoch 2 done"));
    }

    #[test]
    fn test_stdout_only_has_no_file() {
        let mut logger = RunLogger::stdout_only();
        logger.info("no file attached");
    }
}
