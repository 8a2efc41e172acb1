//! End-to-end tests for batches of accounts and the retry limit.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use checkin_orchestrator::{Account, Accounts, RunStep, Runner};
use common::{client_for, hits, profile_for, test_date, FakeUpstream, Scenario, INVALID_OPENID};

fn accounts(toml: &str) -> Accounts {
    Accounts::from_toml_str(toml).expect("Accounts fixture should parse")
}

fn broken_then_working() -> Accounts {
    accounts(&format!(
        r#"
        [user.broken]
        openid = "{INVALID_OPENID}"

        [user.working]
        openid = "o-working"
        nid = ""
        email = ""
        "#
    ))
}

/// A failed account does not stop the accounts after it.
#[tokio::test]
async fn test_failed_account_does_not_stop_batch() {
    let upstream = FakeUpstream::spawn(Scenario::default()).await;
    let out = tempfile::tempdir().expect("tempdir");

    let summary = upstream
        .runner(out.path())
        .run_batch(&broken_then_working())
        .await;

    assert_eq!(summary.runs.len(), 2);
    assert_eq!(summary.runs[0].account, "broken");
    assert_eq!(summary.runs[0].failed_at, Some(RunStep::FetchingToken));
    assert_eq!(summary.runs[1].account, "working");
    assert_eq!(summary.runs[1].step, RunStep::Done);

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(!summary.halted_early);
    assert!(!summary.all_succeeded());
    assert!(summary.finished_at.is_some());
}

/// With fail-fast the batch stops at the first failure.
#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let upstream = FakeUpstream::spawn(Scenario::default()).await;
    let out = tempfile::tempdir().expect("tempdir");

    let summary = upstream
        .runner(out.path())
        .fail_fast(true)
        .run_batch(&broken_then_working())
        .await;

    assert_eq!(summary.runs.len(), 1);
    assert!(summary.halted_early);
    assert!(!summary.all_succeeded());
    assert_eq!(hits(&upstream.hits.token), 1, "Second account never ran");
}

/// Every account succeeding makes the batch succeed.
#[tokio::test]
async fn test_all_accounts_succeed() {
    let upstream = FakeUpstream::spawn(Scenario::default()).await;
    let out = tempfile::tempdir().expect("tempdir");

    let mut selected = accounts(
        r#"
        [user.alice]
        openid = "o-alice"

        [user.bob]
        openid = "o-bob"

        [user.carol]
        openid = "o-carol"
        "#,
    );
    let missing = selected.retain_named(&["carol".to_string(), "alice".to_string()]);
    assert!(missing.is_empty());

    let summary = upstream.runner(out.path()).run_batch(&selected).await;

    let names: Vec<&str> = summary.runs.iter().map(|r| r.account.as_str()).collect();
    assert_eq!(names, vec!["alice", "carol"], "Document order is kept");
    assert!(summary.all_succeeded());
    assert_eq!(hits(&upstream.hits.join), 2);
}

/// An upstream that accepts connections and drops them is tried exactly
/// three times before the account fails.
#[tokio::test]
async fn test_retry_gives_up_after_three_attempts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let base = format!("http://{}", listener.local_addr().expect("No local addr"));

    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });

    let out = tempfile::tempdir().expect("tempdir");
    let runner = Runner::with_client(client_for(&profile_for(&base)), out.path())
        .with_date(test_date());

    let run = runner.run_account(&Account::new("alice", "o-alice")).await;

    assert_eq!(run.failed_at, Some(RunStep::FetchingToken));
    let failure = run.failure.expect("failure reason");
    assert!(failure.contains("fetch_access_token"), "{failure}");
    assert!(failure.contains("3 times"), "{failure}");
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}
