//! Shared test utilities for the release pipeline.

use crate::error::Result;
use crate::publish::executor::{CommandExecutor, Invocation};
use std::process::{ExitStatus, Output};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.cast_unsigned())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

type Responder = Box<dyn Fn(&Invocation) -> Output + Send + Sync>;

/// A `CommandExecutor` that records every invocation.
///
/// Commands run concurrently, so tests should compare the recorded calls as
/// an unordered set, for example through [`RecordingExecutor::argument_sets`].
pub struct RecordingExecutor {
    calls: Mutex<Vec<Invocation>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
    respond: Responder,
}

impl std::fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl RecordingExecutor {
    /// Every command succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::responding(|_| success_output())
    }

    /// Answers each invocation with `respond`.
    #[must_use]
    pub fn responding(respond: impl Fn(&Invocation) -> Output + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Commands whose arguments include `arg` fail with `stderr`; the rest
    /// succeed.
    #[must_use]
    pub fn failing_for(arg: &str, stderr: &str) -> Self {
        let wanted = arg.to_owned();
        let message = stderr.to_owned();
        Self::responding(move |invocation| {
            if invocation.args.iter().any(|candidate| *candidate == wanted) {
                failure_output(&message)
            } else {
                success_output()
            }
        })
    }

    /// Every invocation received so far, in completion order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The arguments of every invocation, sorted for order-independent
    /// comparison.
    #[must_use]
    pub fn argument_sets(&self) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = self
            .invocations()
            .into_iter()
            .map(|invocation| invocation.args)
            .collect();
        sets.sort();
        sets
    }

    /// The timeout passed with every invocation.
    #[must_use]
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn run(&self, invocation: &Invocation, timeout: Option<Duration>) -> Result<Output> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        self.timeouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(timeout);
        Ok((self.respond)(invocation))
    }
}
