use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::Config;
use crate::parse::ParseError;
use crate::record::CfdiRecord;

/// Simple file logger for processed documents with buffered writes
pub struct FileLogger {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileLogger {
    /// Create a new file logger, writing to ~/logs/cfdi-tools/cfdiparse_<timestamp>.log
    pub(crate) fn new() -> Result<Self> {
        let log_dir = cfdi_tools::config::LOG_DIR
            .as_deref()
            .context("Failed to get home directory")?;
        Self::in_directory(log_dir)
    }

    /// Create a new log file in the given directory, creating it if needed.
    pub(crate) fn in_directory(log_dir: &Path) -> Result<Self> {
        if !log_dir.exists() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }

        let path = log_dir.join(format!(
            "{}_{}.log",
            env!("CARGO_BIN_NAME"),
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        ));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log when starting the session
    pub(crate) fn log_init(&mut self, config: &Config) {
        let _ = writeln!(
            self.writer,
            "[{}] INIT {}",
            Self::timestamp(),
            if config.is_batch() { "batch" } else { "interactive" }
        );
        for path in &config.paths {
            let _ = writeln!(self.writer, "  path: \"{}\"", path.display());
        }
        if let Some(output_dir) = &config.output_dir {
            let _ = writeln!(self.writer, "  output: \"{}\"", output_dir.display());
        }
        if let Some(name) = &config.name {
            let _ = writeln!(self.writer, "  name: {name}");
        }
        let _ = writeln!(self.writer, "  keep: {}", config.keep);
        let _ = writeln!(self.writer, "  verbose: {}", config.verbose);
        let _ = self.writer.flush();
    }

    /// Log the workbook the session writes to
    pub(crate) fn log_sink(&mut self, sink_path: &Path, reused: bool) {
        let _ = writeln!(
            self.writer,
            "[{}] {} \"{}\"",
            Self::timestamp(),
            if reused { "OPEN" } else { "CREATE" },
            sink_path.display()
        );
        let _ = self.writer.flush();
    }

    /// Log a document that was appended to the workbook
    pub(crate) fn log_success(&mut self, file_path: &Path, record: &CfdiRecord, row: u32) {
        let _ = writeln!(
            self.writer,
            "[{}] OK \"{}\" row {} uuid {}",
            Self::timestamp(),
            file_path.display(),
            row + 1,
            record.uuid().unwrap_or("-")
        );
        let _ = self.writer.flush();
    }

    /// Log a document that could not be parsed
    pub(crate) fn log_failure(&mut self, file_path: &Path, error: &ParseError) {
        let _ = writeln!(
            self.writer,
            "[{}] FAIL \"{}\"",
            Self::timestamp(),
            file_path.display()
        );
        let _ = writeln!(self.writer, "  error: {error}");
        let _ = self.writer.flush();
    }

    /// Log the end of the session
    pub(crate) fn log_summary(&mut self, processed: usize, failed: usize) {
        let _ = writeln!(
            self.writer,
            "[{}] DONE processed: {processed}, failed: {failed}",
            Self::timestamp()
        );
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod test_file_logger {
    use super::*;

    use std::path::Path;

    use tempfile::tempdir;

    use crate::parse::parse_cfdi_file;

    #[test]
    fn creates_missing_log_directory() {
        let dir = tempdir().expect("create temp dir");
        let log_dir = dir.path().join("logs").join("cfdi-tools");

        let logger = FileLogger::in_directory(&log_dir).expect("should create logger");

        assert!(logger.path().exists());
        assert!(logger.path().starts_with(&log_dir));
        assert!(
            cfdi_tools::has_extension(logger.path(), "log"),
            "unexpected log file name: {}",
            logger.path().display()
        );
    }

    #[test]
    fn writes_session_entries() {
        let dir = tempdir().expect("create temp dir");
        let mut logger = FileLogger::in_directory(dir.path()).expect("should create logger");

        let config = Config {
            name: Some("facturas".to_string()),
            ..Config::default()
        };
        let record = parse_cfdi_file(Path::new("tests/fixtures/cfdi_complete.xml")).expect("should parse");
        let error = parse_cfdi_file(Path::new("tests/fixtures/cfdi_malformed.xml")).expect_err("should fail");

        logger.log_init(&config);
        logger.log_sink(Path::new("/tmp/facturas.xlsx"), false);
        logger.log_success(Path::new("cfdi_complete.xml"), &record, 1);
        logger.log_failure(Path::new("cfdi_malformed.xml"), &error);
        logger.log_summary(1, 1);

        let content = fs::read_to_string(logger.path()).expect("read log");
        assert!(content.contains("INIT interactive"));
        assert!(content.contains("name: facturas"));
        assert!(content.contains("CREATE \"/tmp/facturas.xlsx\""));
        assert!(content.contains("OK \"cfdi_complete.xml\" row 2 uuid 11111111-2222-3333-4444-555555555555"));
        assert!(content.contains("FAIL \"cfdi_malformed.xml\""));
        assert!(content.contains("DONE processed: 1, failed: 1"));
    }
}
