//! The contract every pipeline stage implements.

use crate::context::Context;
use crate::error::Result;
use std::fmt;

/// How a stage run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The stage did its work.
    Completed,
    /// The stage intentionally did nothing; carries the reason.
    Skipped(String),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Skipped`].
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// A step of the release pipeline.
///
/// A scheduler calls [`Stage::defaults`], then [`Stage::skip`], then
/// [`Stage::run`]. `Display` gives the description shown in logs.
pub trait Stage: fmt::Display {
    /// Fills unset configuration with default values.
    ///
    /// # Errors
    ///
    /// Returns an error when existing configuration is unusable.
    fn defaults(&self, ctx: &mut Context) -> Result<()>;

    /// Returns `true` when the stage should not run at all.
    fn skip(&self, ctx: &Context) -> bool;

    /// Runs the stage.
    ///
    /// # Errors
    ///
    /// Returns the first error the stage encountered.
    fn run(&self, ctx: &Context) -> Result<Outcome>;
}

/// Drives `stage` through `defaults`, `skip` and `run`.
///
/// # Errors
///
/// Returns the error of `defaults` or `run`.
pub fn run_stage(stage: &dyn Stage, ctx: &mut Context) -> Result<Outcome> {
    stage.defaults(ctx)?;
    if stage.skip(ctx) {
        log::info!("{stage}: skipped");
        return Ok(Outcome::Skipped(format!("{stage} is disabled")));
    }
    log::info!("{stage}");
    let outcome = stage.run(ctx)?;
    if let Outcome::Skipped(reason) = &outcome {
        log::info!("{stage}: skipped: {reason}");
    }
    Ok(outcome)
}
