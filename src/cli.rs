//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::process::ChildCommand;
use crate::{Result, TapError};

/// Tap a command's stdin, stdout and stderr into an NDJSON recording
#[derive(Debug, Parser)]
#[command(name = "ioetap")]
#[command(about = "Record a command's stdio as NDJSON while passing it through")]
#[command(override_usage = "ioetap [OPTIONS] [--] <COMMAND> [ARGS]...")]
pub struct Cli {
    /// Output file (default: <basename>-<pid>.jsonl)
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Max bytes per line (0 = unlimited, default: 16 MiB)
    #[arg(long, value_name = "BYTES")]
    pub max_line_length: Option<usize>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        required_unless_present = "version"
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Merge defaults, the config file and flags into the final settings
    ///
    /// # Errors
    ///
    /// Returns error if the config file is invalid or no command was given
    pub fn resolve(self) -> Result<(Config, ChildCommand)> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(out) = self.out {
            config.recording.output = Some(out);
        }
        if let Some(max_line_length) = self.max_line_length {
            config.recording.max_line_length = max_line_length;
        }
        config.validate()?;

        let mut words = self.command.into_iter();
        let program = words
            .next()
            .ok_or_else(|| TapError::Config("no command specified".to_string()))?;

        Ok((config, ChildCommand::new(program, words.collect())))
    }
}

/// Version line: `ioetap <version>[ (<commit>)][ built <time>] <os>/<arch>`
///
/// Commit and build time come from the `IOETAP_GIT_COMMIT` and
/// `IOETAP_BUILD_TIME` environment variables at compile time.
#[must_use]
pub fn version_info() -> String {
    let mut info = format!("ioetap {}", env!("CARGO_PKG_VERSION"));

    if let Some(commit) = option_env!("IOETAP_GIT_COMMIT").filter(|c| !c.is_empty()) {
        info.push_str(&format!(" ({commit})"));
    }
    if let Some(built) = option_env!("IOETAP_BUILD_TIME").filter(|t| !t.is_empty()) {
        info.push_str(&format!(" built {built}"));
    }

    info.push_str(&format!(
        " {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ioetap").chain(args.iter().copied()))
    }

    fn resolve(args: &[&str]) -> (Config, ChildCommand) {
        parse(args).unwrap().resolve().unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_only() {
        let (config, command) = resolve(&["ls"]);
        assert_eq!(command, ChildCommand::new("ls", vec![]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_command_args_with_hyphens() {
        let (_, command) = resolve(&["ls", "-la", "--color"]);
        assert_eq!(command.program, "ls");
        assert_eq!(command.args, ["-la", "--color"]);
    }

    #[test]
    fn test_separator() {
        let (_, command) = resolve(&["--", "echo", "hello", "world"]);
        assert_eq!(command.program, "echo");
        assert_eq!(command.args, ["hello", "world"]);
    }

    #[test]
    fn test_program_starting_with_dash_after_separator() {
        let (_, command) = resolve(&["--", "-c", "script.sh"]);
        assert_eq!(command.program, "-c");
        assert_eq!(command.args, ["script.sh"]);
    }

    #[test]
    fn test_out_option() {
        let (config, command) = resolve(&["--out=my file.jsonl", "--", "echo", "hi"]);
        assert_eq!(config.recording.output, Some(PathBuf::from("my file.jsonl")));
        assert_eq!(command.program, "echo");

        let (config, _) = resolve(&["--out", "file.jsonl", "--", "ls"]);
        assert_eq!(config.recording.output, Some(PathBuf::from("file.jsonl")));
    }

    #[test]
    fn test_max_line_length_option() {
        let (config, _) = resolve(&["--max-line-length=100", "--", "ls"]);
        assert_eq!(config.recording.max_line_length, 100);

        let (config, _) = resolve(&["--max-line-length", "0", "ls"]);
        assert_eq!(config.recording.max_line_length, 0);
    }

    #[test]
    fn test_invalid_max_line_length() {
        assert!(parse(&["--max-line-length=-1", "--", "ls"]).is_err());
        assert!(parse(&["--max-line-length=abc", "--", "ls"]).is_err());
    }

    #[test]
    fn test_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--"]).is_err());
        assert!(parse(&["--unknown", "--", "ls"]).is_err());
        assert!(parse(&["-x", "ls"]).is_err());
        assert!(parse(&["--out"]).is_err());
    }

    #[test]
    fn test_version_flag() {
        assert!(parse(&["-v"]).unwrap().version);
        assert!(parse(&["--version"]).unwrap().version);

        // after the command it belongs to the child
        let cli = parse(&["ls", "-v"]).unwrap();
        assert!(!cli.version);
        assert_eq!(cli.command, ["ls", "-v"]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[recording]\noutput = \"from-file.jsonl\"\nmax_line_length = 64\n")
            .unwrap();
        let config_path = file.path().to_str().unwrap().to_string();

        let (config, _) = resolve(&["--config", &config_path, "--", "ls"]);
        assert_eq!(config.recording.output, Some(PathBuf::from("from-file.jsonl")));
        assert_eq!(config.recording.max_line_length, 64);

        let (config, _) = resolve(&["--config", &config_path, "--max-line-length=8", "--", "ls"]);
        assert_eq!(config.recording.max_line_length, 8);
    }

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.starts_with(&format!("ioetap {}", env!("CARGO_PKG_VERSION"))));
        assert!(info.ends_with(std::env::consts::ARCH));
    }
}
