//! Custom publishers: external commands run against release artifacts.
//!
//! For each configured publisher the stage evaluates its `disable`
//! template, selects target artifacts, adds any extra files, and runs the
//! rendered command once per target. Targets of one publisher run
//! concurrently on a bounded pool; publishers run one after another.
//!
//! Every command gets an explicit environment: the allow-listed host
//! variables, then the project environment, then the publisher's own
//! entries (see [`env`]).

pub mod env;
pub mod executor;

use crate::artifact::{Artifact, ArtifactType, Filter, Platform};
use crate::config::PublisherConfig;
use crate::context::{Context, split_env_entry};
use crate::error::{ReleaseError, Result};
use crate::extra_files;
use crate::parallel;
use crate::stage::{Outcome, Stage};
use crate::template;
use camino::Utf8PathBuf;
use env::{EnvList, EnvLookup, HostEnv};
use executor::{CommandExecutor, Invocation, SystemCommandExecutor};
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LABEL: &str = "custom publisher";

/// Runs the configured publishers.
pub struct PublishStage {
    executor: Arc<dyn CommandExecutor>,
    env_lookup: Arc<dyn EnvLookup>,
    timeout: Option<Duration>,
}

impl fmt::Debug for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishStage")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("publishing with custom publishers")
    }
}

impl Default for PublishStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishStage {
    /// Runs real processes and forwards the host's allow-listed variables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: Arc::new(SystemCommandExecutor),
            env_lookup: Arc::new(HostEnv),
            timeout: None,
        }
    }

    /// Replaces the command executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replaces the source of passthrough variables.
    #[must_use]
    pub fn with_env_lookup(mut self, env_lookup: Arc<dyn EnvLookup>) -> Self {
        self.env_lookup = env_lookup;
        self
    }

    /// Kills commands that run longer than `timeout`. Takes precedence over
    /// the project's `timeout_secs`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs `publishers` in order.
    ///
    /// A publisher whose `disable` template renders to `true` is skipped. A
    /// failing publisher does not stop later ones; the first error is
    /// returned once all have had their turn.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. An error rendering a `disable`
    /// template stops the run immediately.
    pub fn execute(&self, ctx: &Context, publishers: &[PublisherConfig]) -> Result<Outcome> {
        let timeout = self
            .timeout
            .or_else(|| ctx.config.timeout_secs.map(Duration::from_secs));
        let mut first_error: Option<ReleaseError> = None;
        let mut ran = 0_usize;

        for publisher in publishers {
            let name = label(publisher);
            match is_disabled(ctx, publisher) {
                Ok(true) => {
                    log::info!("{name}: disabled");
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    keep_first(&mut first_error, err);
                    break;
                }
            }
            ran += 1;
            if let Err(err) = self.publish(ctx, publisher, timeout) {
                log::warn!("{name}: {err}");
                keep_first(&mut first_error, err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None if ran == 0 => Ok(Outcome::Skipped("all publishers are disabled".to_owned())),
            None => Ok(Outcome::Completed),
        }
    }

    fn publish(
        &self,
        ctx: &Context,
        publisher: &PublisherConfig,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let filter = target_filter(publisher);
        let mut targets: Vec<Target> = ctx
            .artifacts
            .filter(|artifact| filter.matches(artifact))
            .iter()
            .map(|artifact| Target::from(&**artifact))
            .collect();
        let extras = extra_files::resolve(&ctx.fields(), &publisher.extra_files)?;
        targets.extend(extras.into_iter().map(|file| Target {
            name: file.name,
            path: file.path,
            id: None,
            platform: None,
        }));

        log::debug!("{}: {} targets", label(publisher), targets.len());
        parallel::try_each(&targets, ctx.parallelism, |target| {
            self.publish_target(ctx, publisher, target, timeout)
        })
    }

    fn publish_target(
        &self,
        ctx: &Context,
        publisher: &PublisherConfig,
        target: &Target,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let invocation = self.invocation(ctx, publisher, target)?;
        log::debug!(
            "{}: running {} {}",
            label(publisher),
            invocation.program,
            shell_words::join(&invocation.args)
        );

        let output = self.executor.run(&invocation, timeout)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!("{}: {}", invocation.program, stdout.trim_end());
        }
        if !output.status.success() {
            return Err(ReleaseError::PublishFailed {
                program: invocation.program,
                status: describe_status(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        log::info!("{}: published {}", label(publisher), target.name);
        Ok(())
    }

    fn invocation(
        &self,
        ctx: &Context,
        publisher: &PublisherConfig,
        target: &Target,
    ) -> Result<Invocation> {
        let fields = ctx.target_fields(
            &target.name,
            &target.path,
            target.id.as_deref(),
            target.platform.as_ref(),
        );

        let mut env = EnvList::passthrough(self.env_lookup.as_ref());
        for (key, value) in &ctx.env {
            env.set(key, value);
        }
        for entry in &publisher.env {
            let rendered = template::render(entry, &fields)?;
            let (key, value) = split_env_entry(&rendered)?;
            env.set(key, value);
        }

        let dir = if publisher.dir.is_empty() {
            None
        } else {
            Some(Utf8PathBuf::from(template::render(&publisher.dir, &fields)?))
        };

        let command = template::render(&publisher.cmd, &fields)?;
        let words = shell_words::split(&command).map_err(|err| ReleaseError::InvalidCommand {
            command: command.clone(),
            reason: err.to_string(),
        })?;
        let Some((program, args)) = words.split_first() else {
            return Err(ReleaseError::EmptyCommand {
                publisher: label(publisher).to_owned(),
            });
        };

        Ok(Invocation {
            program: program.clone(),
            args: args.to_vec(),
            env: env.into_entries(),
            dir,
        })
    }
}

impl Stage for PublishStage {
    fn defaults(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config.publishers.is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<Outcome> {
        self.execute(ctx, &ctx.config.publishers)
    }
}

/// Something a publisher command runs against.
#[derive(Debug, Clone)]
struct Target {
    name: String,
    path: Utf8PathBuf,
    id: Option<String>,
    platform: Option<Platform>,
}

impl From<&Artifact> for Target {
    fn from(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name().to_owned(),
            path: artifact.path().to_owned(),
            id: artifact.id(),
            platform: artifact.platform().cloned(),
        }
    }
}

fn label(publisher: &PublisherConfig) -> &str {
    if publisher.name.is_empty() {
        DEFAULT_LABEL
    } else {
        &publisher.name
    }
}

fn keep_first(slot: &mut Option<ReleaseError>, err: ReleaseError) {
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn is_disabled(ctx: &Context, publisher: &PublisherConfig) -> Result<bool> {
    if publisher.disable.is_empty() {
        return Ok(false);
    }
    let rendered = template::render(&publisher.disable, &ctx.fields())?;
    Ok(rendered == "true")
}

/// Ids select artifacts of any type; otherwise the publishable types,
/// widened by the `checksum` and `signature` flags.
fn target_filter(publisher: &PublisherConfig) -> Filter {
    if !publisher.ids.is_empty() {
        return Filter::ByIds(publisher.ids.clone());
    }
    let mut kinds = ArtifactType::PUBLISHABLE.to_vec();
    if publisher.checksum {
        kinds.push(ArtifactType::Checksum);
    }
    if publisher.signature {
        kinds.extend([ArtifactType::Signature, ArtifactType::Certificate]);
    }
    Filter::ByTypes(kinds)
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal: {signal}");
        }
    }
    status.to_string()
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
