//! ioetap CLI

use std::io::Write;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ioetap::cli::{version_info, Cli};
use ioetap::config::Config;
use ioetap::runner::{self, ParentStdio};

/// Environment variable overriding the configured log filter
const LOG_ENV: &str = "IOETAP_LOG";

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version_info());
        process::exit(0);
    }

    let code = match start(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ioetap: {e:#}");
            1
        }
    };

    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    process::exit(code);
}

fn start(cli: Cli) -> anyhow::Result<i32> {
    let (config, command) = cli.resolve().context("invalid arguments")?;
    init_logging(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(runner::run(&config, &command, ParentStdio::inherit()));

    // the stdin reader may be blocked forever; do not wait for it
    runtime.shutdown_background();

    let summary = result.with_context(|| format!("failed to run {}", command.program))?;
    Ok(summary.exit_code)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
