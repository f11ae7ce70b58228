//! Child process with piped stdio and signal relay

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{Result, TapError};

/// Program and arguments to run under the tap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    /// Program name or path
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl ChildCommand {
    /// Create a command
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Final path component of the program
    #[must_use]
    pub fn basename(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map_or_else(|| self.program.clone(), |name| name.to_string_lossy().into_owned())
    }
}

/// Piped stdio handles of the child
pub struct ChildStdio {
    /// Write end of the child's stdin
    pub stdin: ChildStdin,
    /// Read end of the child's stdout
    pub stdout: ChildStdout,
    /// Read end of the child's stderr
    pub stderr: ChildStderr,
}

/// A running child process
pub struct ChildProcess {
    child: Child,
    pid: u32,
}

impl ChildProcess {
    /// Start `command` with all three stdio streams piped
    ///
    /// # Errors
    ///
    /// Returns error if the process cannot be started
    pub fn spawn(command: &ChildCommand) -> Result<Self> {
        let spawn_error = |source| TapError::Spawn {
            program: command.program.clone(),
            source,
        };

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let pid = child
            .id()
            .ok_or_else(|| spawn_error(io::Error::other("process exited before start")))?;
        debug!("Started {} (pid {})", command.program, pid);

        Ok(Self { child, pid })
    }

    /// Process ID of the child
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the piped stdio handles
    ///
    /// # Errors
    ///
    /// Returns error if the handles were already taken
    pub fn take_stdio(&mut self) -> Result<ChildStdio> {
        match (
            self.child.stdin.take(),
            self.child.stdout.take(),
            self.child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => Ok(ChildStdio {
                stdin,
                stdout,
                stderr,
            }),
            _ => Err(TapError::Io(io::Error::other("child stdio already taken"))),
        }
    }

    /// Kill the child and reap it
    ///
    /// # Errors
    ///
    /// Returns error if the kill or wait fails
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    /// Wait for the child to exit
    ///
    /// # Errors
    ///
    /// Returns error if waiting fails
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }
}

/// Exit code to report for a child status
///
/// A child killed by signal N maps to `128 + N`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Relays termination and user signals received by this process to the child
///
/// Relaying stops when the forwarder is dropped.
pub struct SignalForwarder {
    tasks: Vec<JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalForwarder {
    /// Signals relayed to the child
    pub const SIGNALS: [nix::sys::signal::Signal; 6] = [
        nix::sys::signal::Signal::SIGINT,
        nix::sys::signal::Signal::SIGTERM,
        nix::sys::signal::Signal::SIGHUP,
        nix::sys::signal::Signal::SIGQUIT,
        nix::sys::signal::Signal::SIGUSR1,
        nix::sys::signal::Signal::SIGUSR2,
    ];

    /// Start relaying signals to `pid`
    ///
    /// # Errors
    ///
    /// Returns error if a signal handler cannot be installed
    pub fn install(pid: u32) -> Result<Self> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        use tokio::signal::unix::{signal, SignalKind};

        let child = i32::try_from(pid)
            .map(Pid::from_raw)
            .map_err(|_| TapError::Io(io::Error::other(format!("pid out of range: {pid}"))))?;

        let mut forwarder = Self {
            tasks: Vec::with_capacity(Self::SIGNALS.len()),
        };
        for sig in Self::SIGNALS {
            let mut stream = signal(SignalKind::from_raw(sig as i32))?;
            forwarder.tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    debug!("Forwarding {sig:?} to pid {child}");
                    if let Err(e) = kill(child, sig) {
                        debug!("Failed to forward {sig:?}: {e}");
                    }
                }
            }));
        }

        Ok(forwarder)
    }
}

#[cfg(not(unix))]
impl SignalForwarder {
    /// Signal relay is unix only; this installs nothing
    ///
    /// # Errors
    ///
    /// Never fails
    pub fn install(_pid: u32) -> Result<Self> {
        Ok(Self { tasks: Vec::new() })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
