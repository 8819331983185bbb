//! Running external commands on the host.
//!
//! Every tool this crate talks to (`VBoxManage`, `boot2docker`, `sudo`,
//! `nfsd`) is driven through a [`CommandRunner`]. A call returns the
//! captured [`CommandOutput`] whatever the exit status was; whether a
//! non-zero exit aborts the run is decided per step by a [`StepPolicy`].

use std::fmt;
use std::io::Write as _;
use std::process::{Command, Stdio};

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::{debug, warn};

/// A command line to run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    /// Program to execute, looked up on `PATH` when not a path.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Bytes fed to the child's stdin; stdin is closed when `None`.
    pub stdin: Option<Vec<u8>>,
}

impl HostCommand {
    /// Start building a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words =
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => write!(f, "{} {:?}", self.program, self.args),
        }
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful exit carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed exit with `code` and `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn describe_status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}

/// Something that can run a [`HostCommand`] to completion.
///
/// `Err` means the command could not be run at all (e.g. the program
/// does not exist); a non-zero exit is reported through
/// [`CommandOutput::code`].
pub trait CommandRunner {
    /// Run `cmd`, blocking until it exits.
    fn run(&self, cmd: &HostCommand) -> Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        debug!("Running: {cmd}");
        let mut c = Command::new(&cmd.program);
        c.args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k, v)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = c
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;

        // Feed stdin from a separate thread; `tee` echoes its input and
        // would otherwise block on a full stdout pipe.
        let writer = match (child.stdin.take(), cmd.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(std::thread::spawn(move || {
                pipe.write_all(&input)
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .with_context(|| format!("Waiting for {}", cmd.program))?;
        if let Some(writer) = writer {
            match writer
                .join()
                .map_err(|_| eyre!("stdin writer for {} panicked", cmd.program))?
            {
                // The child exited without reading everything; its status says why.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                r => r.with_context(|| format!("Writing stdin of {}", cmd.program))?,
            }
        }

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} finished: {}", cmd.program, output.describe_status());
        Ok(output)
    }
}

/// How a pipeline step reacts to a failing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StepPolicy {
    /// A spawn failure or non-zero exit aborts the run.
    Checked,
    /// Failures are logged and the run continues.
    Unchecked,
}

/// Run `cmd` and apply `policy` to the result.
///
/// Under [`StepPolicy::Unchecked`] this returns `Ok(None)` when the
/// command could not be spawned, and the output (successful or not)
/// otherwise.
pub fn run_step<R: CommandRunner + ?Sized>(
    runner: &R,
    cmd: &HostCommand,
    policy: StepPolicy,
) -> Result<Option<CommandOutput>> {
    let result = runner.run(cmd);
    match (policy, result) {
        (StepPolicy::Checked, Err(e)) => Err(e),
        (StepPolicy::Checked, Ok(out)) if !out.success() => Err(eyre!(
            "{cmd} failed ({}): {}",
            out.describe_status(),
            out.stderr.trim()
        )),
        (StepPolicy::Unchecked, Err(e)) => {
            warn!("Ignoring failure to run {cmd}: {e:#}");
            Ok(None)
        }
        (StepPolicy::Unchecked, Ok(out)) if !out.success() => {
            warn!(
                "Ignoring failure of {cmd} ({}): {}",
                out.describe_status(),
                out.stderr.trim()
            );
            Ok(Some(out))
        }
        (_, Ok(out)) => Ok(Some(out)),
    }
}
