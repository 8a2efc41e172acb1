//! Per-account check-in runs and the batch loop around them.
//!
//! A run never aborts the process. Whatever stops an account (no token,
//! incomplete data, a rejected check-in, a refused manifest, or any error
//! along the way) is recorded on its [`AccountRun`], and the batch moves on
//! to the next account unless fail-fast is set.

use std::path::PathBuf;

use checkin_mailer::Mailer;
use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, instrument, warn};

use crate::api::ApiClient;
use crate::config::{Account, Accounts, Profile};
use crate::error::{CheckinError, Result};
use crate::rewards::{download_reward_images, work_dir_for};
use crate::run_state::{AccountRun, BatchSummary, RunStep};

/// Drives accounts through the check-in steps.
#[derive(Debug, Clone)]
pub struct Runner {
    client: ApiClient,
    mailer: Option<Mailer>,
    save_root: PathBuf,
    fail_fast: bool,
    date: Option<NaiveDate>,
}

impl Runner {
    /// Creates a runner from the profile: API client, mail relay (if any)
    /// and output root.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(profile: &Profile) -> Result<Self> {
        let client = ApiClient::new(profile)?;
        Ok(Self::with_client(client, profile.output.save_root.clone())
            .with_mailer(profile.mail.clone().map(Mailer::new)))
    }

    /// Creates a runner around an existing client, without a mailer.
    #[must_use]
    pub fn with_client(client: ApiClient, save_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            mailer: None,
            save_root: save_root.into(),
            fail_fast: false,
            date: None,
        }
    }

    /// Sets the mailer used for accounts with an email address.
    #[must_use]
    pub fn with_mailer(mut self, mailer: Option<Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Stops the batch at the first failed account when `true`.
    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Pins the date used for the output folder instead of today.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Runs every account in order and collects the results.
    pub async fn run_batch(&self, accounts: &Accounts) -> BatchSummary {
        let mut summary = BatchSummary::new();
        let total = accounts.len();

        for (index, account) in accounts.iter().enumerate() {
            let run = self.run_account(account).await;
            let failed = !run.is_success();
            summary.push(run);

            let remaining = total - index - 1;
            if failed && self.fail_fast && remaining > 0 {
                warn!(remaining, "Stopping after the first failed account");
                summary.halted_early = true;
                break;
            }
        }

        summary.finish();
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Batch finished"
        );
        summary
    }

    /// Runs one account through every step.
    #[instrument(skip_all, fields(account = %account.name))]
    pub async fn run_account(&self, account: &Account) -> AccountRun {
        let mut run = AccountRun::new(&account.name);
        info!("Checking in");

        match self.drive(account, &mut run).await {
            Ok(()) => info!(elapsed_ms = run.elapsed().num_milliseconds(), "Done"),
            Err(e) => {
                error!(step = %run.step, error = %e, "Check-in failed");
                run.fail(e.to_string());
            }
        }
        run
    }

    async fn drive(&self, account: &Account, run: &mut AccountRun) -> Result<()> {
        run.advance(RunStep::FetchingToken)?;
        let token = self
            .client
            .fetch_access_token(&account.openid)
            .await?
            .ok_or(CheckinError::TokenUnavailable)?;

        run.advance(RunStep::FetchingInfo)?;
        let info = self
            .client
            .fetch_check_in_info(&token, account.nid.as_deref(), account.card_no.as_deref())
            .await?
            .ok_or(CheckinError::CheckInDataIncomplete)?;

        run.advance(RunStep::ReportingScoreBefore)?;
        let score = self.client.fetch_user_score(&token).await?;
        info!(score = %score, "Score before check-in");
        run.score_before = Some(score);

        run.advance(RunStep::SubmittingCheckIn)?;
        let receipt = self
            .client
            .submit_check_in_detailed(&token, &info.data)
            .await?;
        if !receipt.is_success() {
            return Err(CheckinError::CheckInRejected {
                status: receipt.status_text(),
                message: receipt.message_text(),
            });
        }

        run.advance(RunStep::ReportingScoreAfter)?;
        let score = self.client.fetch_user_score(&token).await?;
        info!(score = %score, "Score after check-in");
        run.score_after = Some(score);

        run.advance(RunStep::ProcessingImages)?;
        let work_dir = work_dir_for(&self.save_root, self.today());
        let image = download_reward_images(&self.client, &token, &work_dir, &account.name)
            .await?
            .ok_or(CheckinError::RewardImagesUnavailable)?;
        run.final_image = Some(image.clone());

        match (account.email.as_deref(), &self.mailer) {
            (Some(recipient), Some(mailer)) => {
                run.advance(RunStep::SendingEmail)?;
                mailer.send_confirmation(recipient, &image).await?;
                run.email_sent = true;
            }
            (Some(_), None) => {
                warn!("Account has an email address but no mail relay is configured, not sending");
            }
            (None, _) => debug!("No email address configured"),
        }

        run.advance(RunStep::Done)
    }
}
