//! Run state types for the check-in orchestrator.
//!
//! Each account walks a fixed sequence of steps. [`AccountRun`] records where
//! it got to, what it saw on the way, and why it stopped if it failed;
//! [`BatchSummary`] collects the runs of one invocation.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::Score;
use crate::error::{CheckinError, Result};

// ============================================================================
// RunStep
// ============================================================================

/// Step an account run is currently in.
///
/// The steps run in this order:
/// - `Starting` -> `FetchingToken` -> `FetchingInfo` -> `ReportingScoreBefore`
/// - `SubmittingCheckIn` -> `ReportingScoreAfter` -> `ProcessingImages`
/// - `SendingEmail` (only when the account has an address) -> `Done`
///
/// `Failed` can be entered from any non-terminal step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    /// Run created, nothing sent yet.
    #[default]
    Starting,
    /// Exchanging the openid for an access token.
    FetchingToken,
    /// Resolving node id, card number and course.
    FetchingInfo,
    /// Reading the score before checking in.
    ReportingScoreBefore,
    /// Submitting the check-in.
    SubmittingCheckIn,
    /// Reading the score after checking in.
    ReportingScoreAfter,
    /// Downloading and compositing the reward images.
    ProcessingImages,
    /// Emailing the confirmation image.
    SendingEmail,
    /// All steps completed.
    Done,
    /// The run stopped early.
    Failed,
}

impl RunStep {
    /// Returns `true` if no further transition is possible.
    ///
    /// # Examples
    ///
    /// ```
    /// use checkin_orchestrator::RunStep;
    ///
    /// assert!(RunStep::Done.is_terminal());
    /// assert!(RunStep::Failed.is_terminal());
    /// assert!(!RunStep::SubmittingCheckIn.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The step that normally follows this one.
    #[must_use]
    pub const fn successor(&self) -> Option<Self> {
        match self {
            Self::Starting => Some(Self::FetchingToken),
            Self::FetchingToken => Some(Self::FetchingInfo),
            Self::FetchingInfo => Some(Self::ReportingScoreBefore),
            Self::ReportingScoreBefore => Some(Self::SubmittingCheckIn),
            Self::SubmittingCheckIn => Some(Self::ReportingScoreAfter),
            Self::ReportingScoreAfter => Some(Self::ProcessingImages),
            Self::ProcessingImages => Some(Self::SendingEmail),
            Self::SendingEmail => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns `true` if moving from this step to `next` is allowed.
    ///
    /// Besides the normal successor, `ProcessingImages` may skip straight to
    /// `Done`, and any non-terminal step may move to `Failed`.
    #[must_use]
    pub fn can_advance_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed
            || self.successor() == Some(next)
            || (*self == Self::ProcessingImages && next == Self::Done)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::FetchingToken => "fetching_token",
            Self::FetchingInfo => "fetching_info",
            Self::ReportingScoreBefore => "reporting_score_before",
            Self::SubmittingCheckIn => "submitting_check_in",
            Self::ReportingScoreAfter => "reporting_score_after",
            Self::ProcessingImages => "processing_images",
            Self::SendingEmail => "sending_email",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AccountRun
// ============================================================================

/// Record of one account's run.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRun {
    /// Account name (the key of its `[user.<name>]` table).
    pub account: String,

    /// Current step.
    pub step: RunStep,

    /// Step that was in progress when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<RunStep>,

    /// Why the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Score read before checking in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_before: Option<Score>,

    /// Score read after checking in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_after: Option<Score>,

    /// Path of the composited confirmation image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_image: Option<PathBuf>,

    /// Whether the confirmation email went out.
    pub email_sent: bool,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run last changed.
    pub updated_at: DateTime<Utc>,
}

impl AccountRun {
    /// Creates a run in the `Starting` step.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account: account.into(),
            step: RunStep::Starting,
            failed_at: None,
            failure: None,
            score_before: None,
            score_after: None,
            final_image: None,
            email_sent: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckinError::InvalidStateTransition`] if `next` cannot
    /// follow the current step.
    pub fn advance(&mut self, next: RunStep) -> Result<()> {
        if !self.step.can_advance_to(next) {
            return Err(CheckinError::invalid_transition(self.step, next));
        }
        self.step = next;
        self.touch();
        Ok(())
    }

    /// Marks the run failed at the current step. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.step.is_terminal() {
            return;
        }
        self.failed_at = Some(self.step);
        self.failure = Some(reason.into());
        self.step = RunStep::Failed;
        self.touch();
    }

    /// Returns `true` if the run reached `Done`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.step == RunStep::Done
    }

    /// Updates the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Time between the start and the last change.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }
}

// ============================================================================
// BatchSummary
// ============================================================================

/// Outcome of running a batch of accounts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// One record per account that was attempted, in order.
    pub runs: Vec<AccountRun>,

    /// `true` if fail-fast stopped the batch before every account ran.
    pub halted_early: bool,

    /// When the batch started.
    pub started_at: DateTime<Utc>,

    /// When the batch finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSummary {
    /// Creates an empty summary starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: Vec::new(),
            halted_early: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Appends a finished run.
    pub fn push(&mut self, run: AccountRun) {
        self.runs.push(run);
    }

    /// Number of runs that reached `Done`.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|run| run.is_success()).count()
    }

    /// Number of runs that did not reach `Done`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.runs.len() - self.succeeded()
    }

    /// Returns `true` if every attempted run succeeded and none were skipped.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.halted_early && self.runs.iter().all(AccountRun::is_success)
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Writes the summary to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `CheckinError::Json` if serialization fails and
    /// `CheckinError::Io` if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
