//! Check-in CLI
//!
//! Main entry point for running the daily check-in over every configured account.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use checkin_orchestrator::{
    AccountRun, Accounts, BatchSummary, Profile, RunStep, Runner, ACCOUNTS_FILE_NAME,
    PROFILE_FILE_NAME,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Daily check-in automation
///
/// Exchanges each account's openid for a token, submits the day's check-in,
/// builds the confirmation image and optionally emails it.
#[derive(Parser, Debug)]
#[command(name = "checkin")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the profile file (default: profile.toml in current directory)
    #[arg(short, long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Path to the accounts file (default: config.toml in current directory)
    #[arg(short, long, value_name = "FILE")]
    accounts: Option<PathBuf>,

    /// Root directory for confirmation images (overrides profile output.saveRoot)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Only run the named account (repeatable)
    #[arg(long = "account", value_name = "NAME")]
    account: Vec<String>,

    /// Stop at the first account that fails
    #[arg(long)]
    fail_fast: bool,

    /// Also write the run summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    summary_json: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(profile = ?args.profile, accounts = ?args.accounts, "Config files");

    match run_check_in(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, runs the batch and prints the summary.
///
/// Returns whether every selected account succeeded.
async fn run_check_in(args: Args) -> anyhow::Result<bool> {
    let profile_path = args
        .profile
        .unwrap_or_else(|| PathBuf::from(PROFILE_FILE_NAME));
    let accounts_path = args
        .accounts
        .unwrap_or_else(|| PathBuf::from(ACCOUNTS_FILE_NAME));

    let mut profile = load_profile(&profile_path)?;
    if let Some(output_dir) = args.output_dir {
        profile.output.save_root = output_dir;
    }

    let mut accounts = load_accounts(&accounts_path)?;
    if !args.account.is_empty() {
        for name in accounts.retain_named(&args.account) {
            tracing::warn!(account = %name, "No such account in {}", accounts_path.display());
        }
        if accounts.is_empty() {
            anyhow::bail!(
                "None of the requested accounts exist\n\nSuggestion: Check the names passed with --account against the [user.<name>] tables"
            );
        }
    }

    print_config(&profile, &accounts);

    let runner = Runner::new(&profile)
        .context("Failed to initialize the HTTP client")?
        .fail_fast(args.fail_fast);

    println!();
    let summary = runner.run_batch(&accounts).await;
    print_summary(&summary);

    if let Some(path) = &args.summary_json {
        summary
            .write_json(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("  JSON summary: {}", path.display());
    }

    Ok(summary.all_succeeded())
}

fn load_profile(path: &Path) -> anyhow::Result<Profile> {
    tracing::info!(path = %path.display(), "Loading profile");
    Profile::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
}

fn load_accounts(path: &Path) -> anyhow::Result<Accounts> {
    tracing::info!(path = %path.display(), "Reading openids");
    Accounts::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
}

fn print_config(profile: &Profile, accounts: &Accounts) {
    println!("Configuration loaded:");
    println!("  Accounts: {}", accounts.len());
    println!("  Output directory: {}", profile.output.save_root.display());
    println!(
        "  Retry: {} attempts, {}s apart",
        profile.retry.max_attempts, profile.retry.delay_secs
    );
    println!(
        "  Email: {}",
        profile
            .mail
            .as_ref()
            .map_or_else(|| "disabled".to_string(), |mail| format!("via {}", mail.host))
    );
}

/// Prints one line per account plus the totals.
fn print_summary(summary: &BatchSummary) {
    println!();
    println!("=== Check-in Summary ===");
    for run in &summary.runs {
        print_run(run);
    }

    println!();
    println!(
        "Succeeded: {}  Failed: {}",
        summary.succeeded(),
        summary.failed()
    );
    if summary.halted_early {
        println!("Stopped early after a failure (--fail-fast)");
    }
}

fn print_run(run: &AccountRun) {
    if run.step == RunStep::Done {
        let before = run
            .score_before
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let after = run
            .score_after
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!("  {}: done (score {before} -> {after})", run.account);
        if let Some(image) = &run.final_image {
            println!("    image: {}", image.display());
        }
        if run.email_sent {
            println!("    emailed");
        }
    } else {
        let step = run.failed_at.unwrap_or(run.step);
        let reason = run
            .failure
            .as_deref()
            .and_then(|f| f.lines().next())
            .unwrap_or("unknown");
        println!("  {}: failed at {step}: {reason}", run.account);
    }
}
