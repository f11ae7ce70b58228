//! Runs a child process under the tap
//!
//! Shutdown order: wait for the stdout and stderr tees to reach end of
//! stream, reap the child, then close the recording. The stdin tee is
//! never awaited because its source read may block indefinitely after the
//! child has exited.

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::process::{exit_code, ChildCommand, ChildProcess, SignalForwarder};
use crate::recording::{Recorder, Source, StreamRecorder};
use crate::tee::tee_stream;
use crate::Result;

/// Boxed async reader
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Boxed async writer
pub type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// The parent side of the three tapped streams
pub struct ParentStdio {
    /// Bytes forwarded to the child's stdin
    pub input: BoxReader,
    /// Destination of the child's stdout
    pub output: BoxWriter,
    /// Destination of the child's stderr
    pub error: BoxWriter,
}

impl ParentStdio {
    /// This process's own stdin, stdout and stderr
    #[must_use]
    pub fn inherit() -> Self {
        Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            error: Box::new(tokio::io::stderr()),
        }
    }
}

/// Outcome of a tapped run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Exit code to report for the child
    pub exit_code: i32,
    /// Recording file that was written
    pub output: PathBuf,
    /// Records emitted to the recording
    pub records: u64,
}

/// Run `command`, forwarding and recording its stdio until it exits
///
/// # Errors
///
/// Returns error if the child cannot be started, the recording file cannot
/// be created (the child is killed first), waiting for the child fails, or
/// the recording cannot be flushed on close.
pub async fn run(
    config: &Config,
    command: &ChildCommand,
    stdio: ParentStdio,
) -> Result<RunSummary> {
    let mut child = ChildProcess::spawn(command)?;
    let output = config.output_path(&command.basename(), child.pid());

    let recorder = match Recorder::create(&output, config.recording.max_line_length) {
        Ok(recorder) => recorder,
        Err(e) => {
            if let Err(kill_error) = child.kill().await {
                warn!("Failed to kill child after setup error: {kill_error}");
            }
            return Err(e);
        }
    };

    let forwarder = match SignalForwarder::install(child.pid()) {
        Ok(forwarder) => Some(forwarder),
        Err(e) => {
            warn!("Signal forwarding disabled: {e}");
            None
        }
    };

    let pipes = child.take_stdio()?;

    // detached: dropping a JoinHandle does not cancel the task
    let _stdin = spawn_tee(stdio.input, pipes.stdin, recorder.stream(Source::Stdin)?);
    let stdout = spawn_tee(pipes.stdout, stdio.output, recorder.stream(Source::Stdout)?);
    let stderr = spawn_tee(pipes.stderr, stdio.error, recorder.stream(Source::Stderr)?);

    join_tee(Source::Stdout, stdout).await;
    join_tee(Source::Stderr, stderr).await;

    let status = child.wait().await?;
    drop(forwarder);

    let records = recorder.records_emitted()?;
    recorder.close()?;

    let code = exit_code(status);
    info!(
        "{} exited with {} ({} records in {})",
        command.program,
        code,
        records,
        output.display()
    );

    Ok(RunSummary {
        exit_code: code,
        output,
        records,
    })
}

fn spawn_tee<R, W>(reader: R, writer: W, tap: StreamRecorder) -> JoinHandle<Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(tee_stream(reader, writer, tap))
}

async fn join_tee(source: Source, handle: JoinHandle<Result<u64>>) {
    match handle.await {
        Ok(Ok(bytes)) => debug!("{source} tee finished ({bytes} bytes)"),
        Ok(Err(e)) => warn!("{source} tee stopped: {e}"),
        Err(e) => warn!("{source} tee task failed: {e}"),
    }
}
