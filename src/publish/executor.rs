//! Running publisher commands.

use crate::error::{ReleaseError, Result};
use camino::Utf8PathBuf;
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// A fully resolved command: program, arguments, environment and directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run, as written in the command line.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// The complete environment of the process.
    pub env: Vec<(String, String)>,
    /// Working directory; the current one when `None`.
    pub dir: Option<Utf8PathBuf>,
}

impl Invocation {
    /// Value of `key` in the invocation's environment.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    /// Runs `invocation` to completion and returns its captured output.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// `Output::status`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Spawn`] when the process cannot start and
    /// [`ReleaseError::CommandTimedOut`] when it outlives `timeout`.
    fn run(&self, invocation: &Invocation, timeout: Option<Duration>) -> Result<Output>;
}

/// Executes commands on the host system with an explicit environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, invocation: &Invocation, timeout: Option<Duration>) -> Result<Output> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.dir {
            command.current_dir(dir.as_std_path());
        }

        let mut child = command.spawn().map_err(|source| ReleaseError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => status,
                None => {
                    if let Err(err) = child.kill() {
                        log::debug!("failed to kill {}: {err}", invocation.program);
                    }
                    child.wait()?;
                    return Err(ReleaseError::CommandTimedOut {
                        program: invocation.program.clone(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait()?,
        };

        Ok(Output {
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        })
    }
}

/// Reads a child pipe to the end on its own thread so neither pipe can fill
/// up and block the child.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    reader
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")))
}
