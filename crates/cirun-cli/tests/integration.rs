#![allow(deprecated)]
use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn cirun(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cirun").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("AZURE_DEVOPS_TOKEN")
        .env_remove("CIRUN_GITHUB_API_URL")
        .env_remove("CIRUN_AZURE_API_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("workflows.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

fn github_entry(workflow: &str) -> String {
    format!(r#"{{ "type": "github", "repo": "octo/app", "workflow": "{workflow}", "ref": "main" }}"#)
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// Startup validation
// ---------------------------------------------------------------------------

#[test]
fn no_credentials_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, r#"{ "workflows": [] }"#);

    cirun(&dir)
        .args(["--config", &config])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no credentials"));
}

#[test]
fn blank_token_counts_as_missing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, r#"{ "workflows": [] }"#);

    cirun(&dir)
        .env("GITHUB_TOKEN", "   ")
        .args(["--config", &config])
        .assert()
        .code(2);
}

#[test]
fn missing_config_file_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", missing.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn malformed_entry_fails_before_any_dispatch() {
    let mut server = Server::new();
    let dispatch = server
        .mock("POST", "/repos/octo/app/actions/workflows/ci.yml/dispatches")
        .with_status(204)
        .expect(0)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            r#"{{ "workflows": [ {}, {{ "type": "github", "repo": "no-slash", "workflow": "ci.yml" }} ] }}"#,
            github_entry("ci.yml")
        ),
    );

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--github-api-url", &server.url()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workflows[1]"));

    dispatch.assert();
}

#[test]
fn unknown_entry_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, r#"{ "workflows": [ { "type": "gitlab", "project": "x" } ] }"#);

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workflows[0]"));
}

#[test]
fn malformed_api_url_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, r#"{ "workflows": [] }"#);

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--github-api-url", "not a url"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid API url"));
}

#[test]
fn zero_poll_interval_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, r#"{ "workflows": [] }"#);

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--poll-interval", "0"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

#[test]
fn all_disabled_entries_exit_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "github", "repo": "octo/app", "workflow": "ci.yml", "enabled": false },
            { "type": "azure", "organization": "org", "project": "proj", "pipeline_id": 7, "enabled": false }
        ] }"#,
    );

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["summary"]["skipped"], 2);
    assert_eq!(report["entries"][0]["reason"], "disabled");
}

#[test]
fn entry_without_its_token_is_skipped() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "azure", "organization": "org", "project": "proj", "pipeline_id": 7 }
        ] }"#,
    );

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["summary"]["skipped"], 1);
    assert_eq!(report["entries"][0]["reason"], "missing_credential");
}

// ---------------------------------------------------------------------------
// Dispatch and polling
// ---------------------------------------------------------------------------

#[test]
fn azure_run_is_polled_to_success() {
    let mut server = Server::new();
    let run = server
        .mock("POST", "/org/proj/_apis/pipelines/7/runs")
        .match_query(Matcher::UrlEncoded(
            "api-version".into(),
            "6.0-preview.1".into(),
        ))
        .match_header("authorization", "Basic OmF6LXRva2Vu")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "resources": { "repositories": { "self": { "refName": "refs/heads/release" } } }
        })))
        .with_status(200)
        .with_body(r#"{ "id": 42, "state": "inProgress" }"#)
        .create();
    let status = server
        .mock("GET", "/org/proj/_apis/pipelines/7/runs/42")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{ "id": 42, "state": "completed", "result": "succeeded" }"#)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "azure", "organization": "org", "project": "proj", "pipeline_id": 7, "branch": "release" }
        ] }"#,
    );

    let output = cirun(&dir)
        .env("AZURE_DEVOPS_TOKEN", "az-token")
        .args(["--config", &config, "--json", "--azure-api-url", &server.url()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["summary"]["succeeded"], 1);
    assert_eq!(report["entries"][0]["run_id"], 42);
    assert_eq!(report["entries"][0]["outcome"], "succeeded");
    run.assert();
    status.assert();
}

#[test]
fn github_run_is_resolved_and_polled() {
    let mut server = Server::new();
    let dispatch = server
        .mock("POST", "/repos/octo/app/actions/workflows/ci.yml/dispatches")
        .match_header("authorization", "Bearer gh-token")
        .match_body(Matcher::Json(serde_json::json!({ "ref": "main" })))
        .with_status(204)
        .create();
    let runs = server
        .mock("GET", "/repos/octo/app/actions/workflows/ci.yml/runs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("event".into(), "workflow_dispatch".into()),
            Matcher::UrlEncoded("branch".into(), "main".into()),
        ]))
        .with_status(200)
        .with_body(r#"{ "workflow_runs": [ { "id": 9001, "status": "queued" } ] }"#)
        .create();
    let status = server
        .mock("GET", "/repos/octo/app/actions/runs/9001")
        .with_status(200)
        .with_body(r#"{ "id": 9001, "status": "completed", "conclusion": "success" }"#)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(r#"{{ "workflows": [ {} ] }}"#, github_entry("ci.yml")),
    );

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args([
            "--config",
            &config,
            "--json",
            "--github-api-url",
            &server.url(),
            "--settle-seconds",
            "0",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["entries"][0]["run_id"], 9001);
    assert_eq!(report["entries"][0]["outcome"], "succeeded");
    dispatch.assert();
    runs.assert();
    status.assert();
}

#[test]
fn github_full_ref_name_resolves_by_branch() {
    let mut server = Server::new();
    server
        .mock("POST", "/repos/octo/app/actions/workflows/ci.yml/dispatches")
        .match_body(Matcher::Json(serde_json::json!({ "ref": "refs/heads/main" })))
        .with_status(204)
        .create();
    let runs = server
        .mock("GET", "/repos/octo/app/actions/workflows/ci.yml/runs")
        .match_query(Matcher::UrlEncoded("branch".into(), "main".into()))
        .with_status(200)
        .with_body(r#"{ "workflow_runs": [ { "id": 31 } ] }"#)
        .create();
    server
        .mock("GET", "/repos/octo/app/actions/runs/31")
        .with_status(200)
        .with_body(r#"{ "id": 31, "status": "completed", "conclusion": "success" }"#)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "github", "repo": "octo/app", "workflow": "ci.yml", "ref": "refs/heads/main" }
        ] }"#,
    );

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args([
            "--config",
            &config,
            "--json",
            "--github-api-url",
            &server.url(),
            "--settle-seconds",
            "0",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["entries"][0]["run_id"], 31);
    assert_eq!(report["entries"][0]["outcome"], "succeeded");
    runs.assert();
}

#[test]
fn run_that_never_finishes_times_out() {
    let mut server = Server::new();
    server
        .mock("POST", "/org/proj/_apis/pipelines/7/runs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{ "id": 5 }"#)
        .create();
    let status = server
        .mock("GET", "/org/proj/_apis/pipelines/7/runs/5")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{ "id": 5, "state": "inProgress" }"#)
        .expect(2)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "azure", "organization": "org", "project": "proj", "pipeline_id": 7 }
        ] }"#,
    );

    let output = cirun(&dir)
        .env("AZURE_DEVOPS_TOKEN", "az-token")
        .args([
            "--config",
            &config,
            "--json",
            "--azure-api-url",
            &server.url(),
            "--timeout",
            "1",
            "--poll-interval",
            "1",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report = stdout_json(&output);
    assert_eq!(report["summary"]["timed_out"], 1);
    assert_eq!(report["entries"][0]["outcome"], "timed_out");
    status.assert();
}

// ---------------------------------------------------------------------------
// Halt and continue-on-error
// ---------------------------------------------------------------------------

fn three_github_entries(dir: &TempDir) -> String {
    write_config(
        dir,
        &format!(
            r#"{{ "workflows": [ {}, {}, {} ] }}"#,
            github_entry("one.yml"),
            github_entry("two.yml"),
            github_entry("three.yml")
        ),
    )
}

#[test]
fn failed_dispatch_halts_the_batch() {
    let mut server = Server::new();
    let first = server
        .mock("POST", "/repos/octo/app/actions/workflows/one.yml/dispatches")
        .with_status(204)
        .create();
    let second = server
        .mock("POST", "/repos/octo/app/actions/workflows/two.yml/dispatches")
        .with_status(500)
        .with_body("boom")
        .create();
    let third = server
        .mock("POST", "/repos/octo/app/actions/workflows/three.yml/dispatches")
        .with_status(204)
        .expect(0)
        .create();

    let dir = TempDir::new().unwrap();
    let config = three_github_entries(&dir);

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--no-wait", "--json", "--github-api-url", &server.url()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report = stdout_json(&output);
    assert_eq!(report["halted"], true);
    assert_eq!(report["summary"]["dispatched"], 1);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["not_attempted"], 1);
    assert!(report["entries"][1]["message"]
        .as_str()
        .unwrap()
        .contains("500 - boom"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("batch stopped after 1 failed entry"));
    first.assert();
    second.assert();
    third.assert();
}

#[test]
fn continue_on_error_runs_every_entry() {
    let mut server = Server::new();
    server
        .mock("POST", "/repos/octo/app/actions/workflows/one.yml/dispatches")
        .with_status(204)
        .create();
    server
        .mock("POST", "/repos/octo/app/actions/workflows/two.yml/dispatches")
        .with_status(401)
        .with_body(r#"{ "message": "Bad credentials" }"#)
        .create();
    let third = server
        .mock("POST", "/repos/octo/app/actions/workflows/three.yml/dispatches")
        .with_status(204)
        .expect(1)
        .create();

    let dir = TempDir::new().unwrap();
    let config = three_github_entries(&dir);

    let output = cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args([
            "--config",
            &config,
            "--no-wait",
            "--continue-on-error",
            "--json",
            "--github-api-url",
            &server.url(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["halted"], false);
    assert_eq!(report["summary"]["dispatched"], 2);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["entries"][1]["kind"], "dispatch_unauthorized");
    third.assert();
}

// ---------------------------------------------------------------------------
// Output modes
// ---------------------------------------------------------------------------

#[test]
fn table_output_lists_entries_and_summary() {
    let mut server = Server::new();
    server
        .mock("POST", "/repos/octo/app/actions/workflows/ci.yml/dispatches")
        .with_status(204)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "name": "build", "type": "github", "repo": "octo/app", "workflow": "ci.yml" }
        ] }"#,
    );

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--no-wait", "--github-api-url", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("dispatched"))
        .stdout(predicate::str::contains("1 entries: 0 succeeded, 1 dispatched"));
}

#[test]
fn dry_run_makes_no_requests() {
    let mut server = Server::new();
    let dispatch = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"{ "workflows": [
            { "type": "github", "repo": "octo/app", "workflow": "ci.yml" },
            { "type": "azure", "organization": "org", "project": "proj", "pipeline_id": 7 }
        ] }"#,
    );

    cirun(&dir)
        .env("GITHUB_TOKEN", "gh-token")
        .args(["--config", &config, "--dry-run", "--github-api-url", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("trigger"))
        .stdout(predicate::str::contains("skip (no token)"));

    dispatch.assert();
}

#[test]
fn tokens_never_reach_the_logs() {
    let mut server = Server::new();
    server
        .mock("POST", "/repos/octo/app/actions/workflows/ci.yml/dispatches")
        .with_status(204)
        .create();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(r#"{{ "workflows": [ {} ] }}"#, github_entry("ci.yml")),
    );

    cirun(&dir)
        .env("GITHUB_TOKEN", "super-secret-token")
        .args([
            "--config",
            &config,
            "--no-wait",
            "--verbose",
            "--github-api-url",
            &server.url(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("super-secret-token").not())
        .stdout(predicate::str::contains("super-secret-token").not());
}
