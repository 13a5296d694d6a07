//! External process execution.
//!
//! Child processes inherit the caller's environment and working directory.
//! Their stdout and stderr are drained as data arrives and returned as text
//! once both streams have closed and the exit status is known.

use crate::{Error, Result};
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::debug;

/// Placeholder logged in place of a secret argument.
pub const REDACTED: &str = "[REDACTED]";

/// Render `args` for logging with the value after each `/p` masked.
///
/// # Examples
///
/// ```
/// use windows_sign::spawn::redact_args;
///
/// assert_eq!(
///     redact_args(&["sign", "/p", "hunter2", "/fd", "sha1"]),
///     vec!["sign", "/p", "[REDACTED]", "/fd", "sha1"]
/// );
/// ```
pub fn redact_args<S: AsRef<OsStr>>(args: &[S]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut mask_next = false;

    for arg in args {
        let arg = arg.as_ref();
        if mask_next {
            redacted.push(REDACTED.to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg.eq_ignore_ascii_case("/p");
        redacted.push(arg.to_string_lossy().into_owned());
    }

    redacted
}

/// A program to run together with its arguments and optional stdin payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl Invocation {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Bytes written to the child's stdin before it is closed.
    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Arguments safe to write to logs.
    pub fn redacted_args(&self) -> Vec<String> {
        redact_args(&self.args)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.redacted_args())
            .field("stdin_len", &self.stdin.as_ref().map(Vec::len))
            .finish()
    }
}

/// Outcome of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code, or `-1` if the process was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external programs.
///
/// [`SystemRunner`] spawns real processes; tests substitute a recording fake.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// A non-zero exit code is *not* an error at this level; callers inspect
    /// [`ProcessResult::code`].
    async fn run(&self, invocation: &Invocation) -> Result<ProcessResult>;
}

/// Spawns child processes with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessResult> {
        let program = invocation.program();
        debug!(
            program = %program.display(),
            args = ?invocation.redacted_args(),
            "Spawning process"
        );

        let stdin = if invocation.get_stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(program)
            .args(invocation.get_args())
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let (_, stdout, stderr, status) = tokio::try_join!(
            feed_stdin(stdin_pipe, invocation.get_stdin()),
            drain(program, "stdout", stdout_pipe),
            drain(program, "stderr", stderr_pipe),
            child.wait(),
        )?;

        let code = status.code().unwrap_or(-1);
        debug!(program = %program.display(), code, "Child process exited");

        Ok(ProcessResult {
            code,
            stdout,
            stderr,
        })
    }
}

async fn feed_stdin(pipe: Option<ChildStdin>, bytes: Option<&[u8]>) -> std::io::Result<()> {
    let (Some(mut pipe), Some(bytes)) = (pipe, bytes) else {
        return Ok(());
    };

    match pipe.write_all(bytes).await {
        // The child may exit without reading its input.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn drain<R>(program: &Path, stream: &str, reader: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut collected = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        debug!(
            program = %program.display(),
            stream,
            "{}",
            String::from_utf8_lossy(&buf[..n])
        );
        collected.extend_from_slice(&buf[..n]);
    }

    Ok(String::from_utf8_lossy(&collected).into_owned())
}
