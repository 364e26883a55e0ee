//! Running the control utility as a child process.

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{PactlError, PactlResult};

/// Control utility run when no other program is configured.
pub const DEFAULT_PROGRAM: &str = "pactl";

/// Command prefix that runs the control utility in another context.
///
/// The full control utility command line is assembled into one string and
/// appended as the wrapper's last argument, e.g. `flatpak-spawn --host sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWrapper {
    words: Vec<String>,
}

impl CommandWrapper {
    /// Create a wrapper from its words. Returns `None` if there are none.
    #[must_use]
    pub fn new(words: Vec<String>) -> Option<Self> {
        if words.is_empty() { None } else { Some(Self { words }) }
    }

    /// Create a wrapper from a whitespace-separated string.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        Self::new(spec.split_whitespace().map(str::to_string).collect())
    }

    /// The wrapper's words.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Spawns the control utility.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    wrapper: Option<CommandWrapper>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, None)
    }
}

impl ProcessRunner {
    /// Create a runner for `program`, optionally run through `wrapper`.
    #[must_use]
    pub fn new(program: impl Into<String>, wrapper: Option<CommandWrapper>) -> Self {
        Self { program: program.into(), wrapper }
    }

    /// The control utility being run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The configured shell wrapper, if any.
    #[must_use]
    pub fn wrapper(&self) -> Option<&CommandWrapper> {
        self.wrapper.as_ref()
    }

    /// Build the command for the given arguments without running it.
    #[must_use]
    pub fn command(&self, args: &[&str]) -> Command {
        match &self.wrapper {
            Some(wrapper) => {
                let line = std::iter::once(self.program.as_str())
                    .chain(args.iter().copied())
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut command = Command::new(&wrapper.words[0]);
                command.args(&wrapper.words[1..]).arg(line);
                command
            }
            None => {
                let mut command = Command::new(&self.program);
                command.args(args);
                command
            }
        }
    }

    /// Start the control utility with the given arguments.
    ///
    /// # Errors
    /// Returns an error if the process cannot be spawned.
    pub fn run(&self, args: &[&str]) -> PactlResult<ProcessOutput> {
        let mut command = self.command(args);
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(?command, "Running command");

        let mut child = command
            .spawn()
            .map_err(|source| PactlError::Spawn { program: self.program.clone(), source })?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PactlError::Io(io::Error::other("child pipes were not captured")));
        };

        // Drained on its own thread so a full stderr pipe cannot stall stdout.
        let stderr = thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| String::from_utf8_lossy(&buf).into_owned())
        });

        Ok(ProcessOutput {
            stdout: BufReader::new(stdout),
            guard: ChildGuard {
                program: self.program.clone(),
                child: Some(child),
                stderr: Some(stderr),
            },
        })
    }

    /// Run the control utility to completion and return its stdout.
    ///
    /// # Errors
    /// Returns an error if the process cannot be spawned, its output cannot
    /// be read, or it exits unsuccessfully.
    pub fn output(&self, args: &[&str]) -> PactlResult<String> {
        let mut output = self.run(args)?;
        let stdout = output.read_to_string()?;
        output.finish()?;
        Ok(stdout)
    }
}

/// A running control utility process.
///
/// Call [`ProcessOutput::finish`] to check the exit status. Dropping the
/// output without finishing still closes stdout and reaps the child.
#[derive(Debug)]
pub struct ProcessOutput {
    // Declared first so it is closed before the guard waits.
    stdout: BufReader<ChildStdout>,
    guard: ChildGuard,
}

impl ProcessOutput {
    /// Iterate over the remaining stdout lines.
    pub fn lines(&mut self) -> impl Iterator<Item = io::Result<String>> + '_ {
        self.stdout.by_ref().lines()
    }

    /// Read one line of stdout without its line terminator.
    ///
    /// Returns `None` at end of output.
    ///
    /// # Errors
    /// Returns an error if stdout cannot be read.
    pub fn read_line(&mut self) -> PactlResult<Option<String>> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(len);
        Ok(Some(line))
    }

    /// Read the rest of stdout.
    ///
    /// # Errors
    /// Returns an error if stdout cannot be read or is not UTF-8.
    pub fn read_to_string(&mut self) -> PactlResult<String> {
        let mut text = String::new();
        self.stdout.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Close stdout and wait for the process to exit.
    ///
    /// # Errors
    /// Returns [`PactlError::ProcessFailed`] with the captured stderr if the
    /// process exits unsuccessfully, or [`PactlError::WaitFailed`] if
    /// waiting fails.
    pub fn finish(self) -> PactlResult<()> {
        let Self { stdout, mut guard } = self;
        drop(stdout);
        guard.wait()
    }
}

#[derive(Debug)]
struct ChildGuard {
    program: String,
    child: Option<Child>,
    stderr: Option<JoinHandle<io::Result<String>>>,
}

impl ChildGuard {
    fn wait(&mut self) -> PactlResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|source| PactlError::WaitFailed { program: self.program.clone(), source })?;

        let stderr = match self.stderr.take().map(JoinHandle::join) {
            Some(Ok(Ok(text))) => text,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "Failed to read stderr");
                String::new()
            }
            Some(Err(_)) => {
                warn!("Stderr reader panicked");
                String::new()
            }
            None => String::new(),
        };

        if status.success() {
            debug!(program = %self.program, "Process finished");
            return Ok(());
        }

        Err(PactlError::ProcessFailed {
            program: self.program.clone(),
            code: status.code(),
            stderr: stderr.trim_end().to_string(),
        })
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait() {
                warn!(program = %self.program, error = %e, "Failed to reap process");
            }
        }
    }
}

/// Quote a word for a POSIX shell if it needs it.
fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word.chars().all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}
