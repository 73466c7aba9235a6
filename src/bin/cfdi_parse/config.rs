//! Configuration module for cfdiparse.
//!
//! Handles reading configuration from CLI arguments and the user config file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::CfdiParseArgs;

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct CfdiParseConfig {
    /// Output directory for the Excel file.
    #[serde(default)]
    pub output: Option<String>,
    /// Excel file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Append to an existing Excel file instead of recreating it.
    #[serde(default)]
    pub keep: bool,
    /// Write a session log file.
    #[serde(default)]
    pub log: bool,
    /// Print verbose output.
    #[serde(default)]
    pub verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    cfdiparse: CfdiParseConfig,
}

impl CfdiParseConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        let Some(path) = cfdi_tools::config::CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow!("Failed to read config file {}: {error}", path.display())),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.cfdiparse)
            .map_err(|e| anyhow!("Failed to parse config: {e}"))
    }
}

/// Final config combined from CLI arguments and user config file.
#[derive(Debug, Default)]
pub struct Config {
    /// XML files or directories to process without prompting.
    /// Empty for an interactive session.
    pub paths: Vec<PathBuf>,
    /// Directory for the Excel file, prompted for when missing.
    pub output_dir: Option<PathBuf>,
    /// Excel file name, prompted for when missing.
    pub name: Option<String>,
    /// Append to an existing Excel file instead of recreating it.
    pub keep: bool,
    /// Write a session log file.
    pub log: bool,
    /// Print verbose output.
    pub verbose: bool,
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the config file is invalid or an input path does not exist.
    pub fn from_args(args: &CfdiParseArgs) -> Result<Self> {
        Self::from_args_and_config(args, &CfdiParseConfig::get_user_config()?)
    }

    /// Create config from given command line args and explicit user config.
    /// This is useful for testing without reading from the config file.
    ///
    /// # Errors
    /// Returns an error if an input path does not exist.
    pub fn from_args_and_config(args: &CfdiParseArgs, user_config: &CfdiParseConfig) -> Result<Self> {
        let paths = args
            .path
            .iter()
            .map(|path| cfdi_tools::resolve_input_path(path))
            .collect::<Result<Vec<_>>>()?;

        // CLI args take priority over user config
        let output = non_empty(args.output.as_deref()).or_else(|| non_empty(user_config.output.as_deref()));
        let output_dir = match paths.first() {
            // Batch mode defaults to the directory of the first input
            Some(first) => Some(cfdi_tools::resolve_output_path(output, first)?),
            None => output.map(cfdi_tools::path_from_user_input),
        };
        let name = non_empty(args.name.as_deref())
            .or_else(|| non_empty(user_config.name.as_deref()))
            .map(ToString::to_string);

        // Boolean flags: CLI true overrides config, otherwise use config value
        let keep = args.keep || user_config.keep;
        let log = args.log || user_config.log;
        let verbose = args.verbose || user_config.verbose;

        Ok(Self {
            paths,
            output_dir,
            name,
            keep,
            log,
            verbose,
        })
    }

    /// True when documents come from the command line instead of prompts.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        !self.paths.is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod test_cfdi_parse_config {
    use super::*;

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = CfdiParseConfig::from_toml_str("").expect("should parse empty config");
        assert!(config.output.is_none());
        assert!(config.name.is_none());
        assert!(!config.keep);
        assert!(!config.log);
        assert!(!config.verbose);
    }

    #[test]
    fn from_toml_str_parses_cfdiparse_section() {
        let toml = r#"
[cfdiparse]
output = "/home/user/Documentos"
name = "facturas_2025"
keep = true
log = true
verbose = true
"#;
        let config = CfdiParseConfig::from_toml_str(toml).expect("should parse config");
        assert_eq!(config.output.as_deref(), Some("/home/user/Documentos"));
        assert_eq!(config.name.as_deref(), Some("facturas_2025"));
        assert!(config.keep);
        assert!(config.log);
        assert!(config.verbose);
    }

    #[test]
    fn from_toml_str_parses_partial_config() {
        let toml = r#"
[cfdiparse]
name = "enero"
"#;
        let config = CfdiParseConfig::from_toml_str(toml).expect("should parse config");
        assert_eq!(config.name.as_deref(), Some("enero"));
        assert!(config.output.is_none());
        assert!(!config.keep);
    }

    #[test]
    fn from_toml_str_ignores_other_sections() {
        let toml = r#"
[reports]
verbose = true

[cfdiparse]
keep = true
"#;
        let config = CfdiParseConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.keep);
        assert!(!config.verbose);
    }

    #[test]
    fn from_toml_str_invalid_toml_returns_error() {
        let result = CfdiParseConfig::from_toml_str("this is not valid toml {{{");
        assert!(result.is_err());
    }

    #[test]
    fn from_toml_str_wrong_type_returns_error() {
        let toml = r#"
[cfdiparse]
keep = "yes"
"#;
        assert!(CfdiParseConfig::from_toml_str(toml).is_err());
    }
}
