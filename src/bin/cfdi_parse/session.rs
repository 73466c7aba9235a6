use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::logger::FileLogger;
use crate::parse::{ParseError, parse_cfdi_file};
use crate::record::CfdiRecord;
use crate::sink::{DEFAULT_SINK_NAME, Sink, SinkError, sink_path};

/// Answers that continue the interactive loop.
const AFFIRMATIVE_ANSWERS: [&str; 5] = ["s", "si", "sí", "y", "yes"];

/// Loop states after the workbook has been set up.
#[derive(Debug)]
enum State {
    AwaitingDocument,
    ParseSucceeded { path: PathBuf, record: CfdiRecord },
    ParseFailed { path: PathBuf, error: ParseError },
    AwaitingContinueDecision,
    Terminated,
}

/// One run of the extractor.
///
/// Prompts are read from `input` and all messages are written to `output`,
/// so the same code drives a terminal session and tests.
pub struct Session<R, W> {
    config: Config,
    input: R,
    output: W,
    logger: Option<FileLogger>,
    processed: usize,
    failed: usize,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub const fn new(config: Config, input: R, output: W) -> Self {
        Self {
            config,
            input,
            output,
            logger: None,
            processed: 0,
            failed: 0,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: FileLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set up the workbook, process documents until done, and return the number of rows added.
    pub fn run(mut self) -> Result<usize> {
        writeln!(self.output, "{}", "CFDI 4.0 data extractor".bold().magenta())?;
        if let Some(logger) = &mut self.logger {
            logger.log_init(&self.config);
        }

        let sink = if self.config.is_batch() {
            // Fail before the workbook is created or truncated
            let files = self.collect_batch_files()?;
            if files.is_empty() {
                anyhow::bail!("No XML files to process");
            }
            let sink = self.setup_sink()?;
            self.process_batch(&sink, &files)?;
            sink
        } else {
            let sink = self.setup_sink()?;
            self.process_interactive(&sink)?;
            sink
        };

        self.print_summary(&sink)?;
        Ok(self.processed)
    }

    /// Create or reuse the workbook.
    /// Missing values are prompted for and a missing directory is asked again.
    fn setup_sink(&mut self) -> Result<Sink> {
        let name = match self.config.name.clone() {
            Some(name) => name,
            None if self.config.is_batch() => DEFAULT_SINK_NAME.to_string(),
            None => self.prompt_sink_name()?,
        };

        let mut configured_directory = self.config.output_dir.clone();
        loop {
            let directory = match configured_directory.take() {
                Some(directory) => directory,
                None => cfdi_tools::path_from_user_input(&self.prompt_line("Directory for the Excel file: ")?),
            };

            match self.open_sink(&directory, &name) {
                Ok((sink, reused)) => {
                    let action = if reused { "Appending to" } else { "Created" };
                    writeln!(
                        self.output,
                        "{}",
                        format!("{action} Excel file: {}", sink.path().display()).green()
                    )?;
                    if let Some(logger) = &mut self.logger {
                        logger.log_sink(sink.path(), reused);
                    }
                    return Ok(sink);
                }
                Err(SinkError::MissingDirectory(path)) if !self.config.is_batch() => {
                    writeln!(
                        self.output,
                        "{}",
                        format!("Directory does not exist: '{}'. Try again.", path.display()).yellow()
                    )?;
                }
                Err(error) => return Err(error).context("Failed to set up the Excel file"),
            }
        }
    }

    /// Returns the sink and whether an existing workbook was reused.
    fn open_sink(&self, directory: &Path, name: &str) -> Result<(Sink, bool), SinkError> {
        if self.config.keep {
            let path = sink_path(directory, name)?;
            if path.is_file() {
                return Sink::open(&path).map(|sink| (sink, true));
            }
        }
        Sink::initialize(directory, name).map(|sink| (sink, false))
    }

    fn process_interactive(&mut self, sink: &Sink) -> Result<()> {
        let mut state = State::AwaitingDocument;
        loop {
            state = match state {
                State::AwaitingDocument => {
                    let path = self.prompt_document()?;
                    match parse_cfdi_file(&path) {
                        Ok(record) => State::ParseSucceeded { path, record },
                        Err(error) => State::ParseFailed { path, error },
                    }
                }
                State::ParseSucceeded { path, record } => {
                    self.store(sink, &path, &record)?;
                    State::AwaitingContinueDecision
                }
                State::ParseFailed { path, error } => {
                    self.report_failure(&path, &error)?;
                    State::AwaitingContinueDecision
                }
                State::AwaitingContinueDecision => {
                    if self.prompt_continue()? {
                        State::AwaitingDocument
                    } else {
                        State::Terminated
                    }
                }
                State::Terminated => return Ok(()),
            };
        }
    }

    fn process_batch(&mut self, sink: &Sink, files: &[(PathBuf, PathBuf)]) -> Result<()> {
        let digits = files.len().checked_ilog10().map_or(1, |d| d as usize + 1);
        for (number, (root, file)) in files.iter().enumerate() {
            writeln!(
                self.output,
                "{}",
                format!(
                    "{:>0width$}: {}",
                    number + 1,
                    cfdi_tools::get_relative_path_or_filename(file, root),
                    width = digits
                )
                .bold()
            )?;
            match parse_cfdi_file(file) {
                Ok(record) => self.store(sink, file, &record)?,
                Err(error) => self.report_failure(file, &error)?,
            }
        }
        Ok(())
    }

    /// Expand batch inputs to XML files, paired with the root used for display.
    fn collect_batch_files(&mut self) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut files = Vec::new();
        for path in &self.config.paths {
            if path.is_dir() {
                files.extend(cfdi_tools::get_xml_files(path).into_iter().map(|file| (path.clone(), file)));
            } else if cfdi_tools::has_extension(path, "xml") {
                let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                files.push((root, path.clone()));
            } else {
                writeln!(
                    self.output,
                    "{}",
                    format!("Skipping non-XML file: {}", path.display()).yellow()
                )?;
            }
        }
        Ok(files)
    }

    fn store(&mut self, sink: &Sink, path: &Path, record: &CfdiRecord) -> Result<()> {
        if !self.config.is_batch() || self.config.verbose {
            writeln!(self.output, "{}", "Extracted data:".bold())?;
            write!(self.output, "{record}")?;
        }

        let row = sink
            .append(record)
            .with_context(|| format!("Failed to add row to {}", sink.path().display()))?;
        self.processed += 1;

        writeln!(
            self.output,
            "{}",
            format!(
                "Row {} added: {} Total {:.2}",
                row + 1,
                record.uuid().unwrap_or("(no UUID)"),
                record.amount("Total").unwrap_or_default()
            )
            .green()
        )?;
        if let Some(logger) = &mut self.logger {
            logger.log_success(path, record, row);
        }
        Ok(())
    }

    fn report_failure(&mut self, path: &Path, error: &ParseError) -> Result<()> {
        self.failed += 1;
        writeln!(self.output, "{}", format!("Could not process file: {error}").red())?;
        if let Some(logger) = &mut self.logger {
            logger.log_failure(path, error);
        }
        Ok(())
    }

    fn print_summary(&mut self, sink: &Sink) -> Result<()> {
        let files = if self.processed == 1 { "file" } else { "files" };
        writeln!(
            self.output,
            "{}",
            format!("Processed {} {files} successfully", self.processed).bold()
        )?;
        if self.failed > 0 {
            writeln!(self.output, "{}", format!("Failed: {}", self.failed).red())?;
        }
        let rows = sink
            .data_rows()
            .with_context(|| format!("Failed to read {}", sink.path().display()))?;
        writeln!(self.output, "Excel file: {} ({rows} data rows)", sink.path().display())?;

        if let Some(logger) = &mut self.logger {
            logger.log_summary(self.processed, self.failed);
            if self.config.verbose {
                writeln!(self.output, "Log file: {}", logger.path().display())?;
            }
        }
        Ok(())
    }

    fn prompt_sink_name(&mut self) -> Result<String> {
        loop {
            let name = self.prompt_line("Excel file name (without extension): ")?;
            if !name.is_empty() {
                return Ok(name);
            }
            writeln!(self.output, "{}", "The file name cannot be empty.".yellow())?;
        }
    }

    /// Ask for a document path until an existing file is given.
    fn prompt_document(&mut self) -> Result<PathBuf> {
        loop {
            let path = cfdi_tools::path_from_user_input(&self.prompt_line("Path to the CFDI XML file: ")?);
            if path.is_file() {
                return Ok(path);
            }
            writeln!(
                self.output,
                "{}",
                format!("File not found: '{}'. Try again.", path.display()).yellow()
            )?;
        }
    }

    /// End of input counts as a negative answer.
    fn prompt_continue(&mut self) -> Result<bool> {
        let answer = self.read_answer("Add another CFDI? (s/n): ")?;
        Ok(answer.is_some_and(|answer| is_affirmative(&answer)))
    }

    /// Prompt for a line that is required to continue.
    fn prompt_line(&mut self, message: &str) -> Result<String> {
        self.read_answer(message)?
            .context("Input ended before the session was finished")
    }

    /// Print the prompt and read one trimmed line, `None` at end of input.
    fn read_answer(&mut self, message: &str) -> Result<Option<String>> {
        write!(self.output, "{}", message.cyan())?;
        self.output.flush().context("Failed to flush output")?;

        let mut input = String::new();
        let bytes = self.input.read_line(&mut input).context("Failed to read input")?;
        if bytes == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}

/// Only an explicit yes continues.
fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    AFFIRMATIVE_ANSWERS.contains(&answer.as_str())
}
