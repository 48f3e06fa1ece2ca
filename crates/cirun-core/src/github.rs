//! GitHub Actions backend: `workflow_dispatch`, run lookup and run status.
//!
//! The dispatch endpoint answers `204 No Content` without a run id, so the
//! new run is found afterwards by listing the workflow's most recent
//! `workflow_dispatch` run on the dispatched ref. This is best effort: two
//! dispatches of the same workflow and ref in quick succession (from this
//! tool or anyone else) can resolve to the other run.

use crate::backend::{Backend, Dispatched};
use crate::config::GitHubWorkflow;
use crate::error::{CirunError, Result};
use crate::http;
use crate::types::{BackendKind, RunId, RunStatus};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";

pub struct GitHubClient {
    http: Client,
    base: Url,
    token: String,
    settle_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct WorkflowRuns {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
}

/// `completed` + `success` is a pass, any other conclusion of a completed
/// run is a failure, everything else is still running.
pub fn classify(status: Option<&str>, conclusion: Option<&str>) -> RunStatus {
    match (status, conclusion) {
        (Some("completed"), Some("success")) => RunStatus::Succeeded,
        (Some("completed"), _) => RunStatus::Failed,
        _ => RunStatus::Pending,
    }
}

/// The name a run reports as its `head_branch` for a dispatched ref:
/// `refs/heads/main` and `main` both give `main`, `refs/tags/v1` gives `v1`.
/// Other fully qualified refs have no such name.
fn head_branch(git_ref: &str) -> Option<&str> {
    if let Some(rest) = git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
    {
        return Some(rest);
    }
    if git_ref.starts_with("refs/") {
        return None;
    }
    Some(git_ref)
}

impl GitHubClient {
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base: http::parse_base(base_url)?,
            token: token.into(),
            settle_delay: SETTLE_DELAY,
        })
    }

    pub fn settle_after_dispatch(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn repo_endpoint(&self, repo: &str, rest: &[&str]) -> Result<Url> {
        let segments = std::iter::once("repos")
            .chain(repo.split('/'))
            .chain(rest.iter().copied());
        http::endpoint(&self.base, segments)
    }

    fn authorized(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(ACCEPT, MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
    }

    /// POST a `workflow_dispatch` event. Only `204` counts as success.
    pub fn dispatch_workflow(&self, wf: &GitHubWorkflow) -> Result<()> {
        let workflow = wf.workflow.to_string();
        let url = self.repo_endpoint(&wf.repo, &["actions", "workflows", &workflow, "dispatches"])?;
        let mut body = json!({ "ref": wf.git_ref });
        if !wf.inputs.is_empty() {
            body["inputs"] = Value::Object(wf.inputs.clone());
        }

        info!("Triggering workflow {} in {} with ref {}", wf.workflow, wf.repo, wf.git_ref);
        debug!(%url, "POST workflow dispatch");
        let response = self.authorized(self.http.post(url)).json(&body).send()?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                info!("Successfully triggered workflow {} in {}", wf.workflow, wf.repo);
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Err(CirunError::Unauthorized {
                target: wf.to_string(),
            }),
            status => Err(CirunError::DispatchRejected {
                target: wf.to_string(),
                status: status.as_u16(),
                body: http::body_text(response),
            }),
        }
    }

    /// Id of the most recent `workflow_dispatch` run of `wf` on its ref, if
    /// any. Refs without a short branch or tag name are not filtered on.
    pub fn latest_run_id(&self, wf: &GitHubWorkflow) -> Result<Option<RunId>> {
        let workflow = wf.workflow.to_string();
        let url = self.repo_endpoint(&wf.repo, &["actions", "workflows", &workflow, "runs"])?;
        let mut query = vec![("per_page", "1"), ("event", "workflow_dispatch")];
        if let Some(branch) = head_branch(&wf.git_ref) {
            query.push(("branch", branch));
        }
        debug!(%url, ?query, "GET latest workflow run");
        let response = self.authorized(self.http.get(url)).query(&query).send()?;
        let runs: WorkflowRuns = http::json_or_status(response)?;
        Ok(runs.workflow_runs.first().map(|run| RunId(run.id)))
    }

    pub fn run_status(&self, repo: &str, run: RunId) -> Result<RunStatus> {
        let id = run.to_string();
        let url = self.repo_endpoint(repo, &["actions", "runs", &id])?;
        debug!(%url, "GET workflow run");
        let response = self.authorized(self.http.get(url)).send()?;
        let detail: WorkflowRun = http::json_or_status(response)?;
        let status = classify(detail.status.as_deref(), detail.conclusion.as_deref());
        debug!(
            run = detail.id,
            status = detail.status.as_deref().unwrap_or("unknown"),
            conclusion = detail.conclusion.as_deref().unwrap_or("none"),
            "workflow run status"
        );
        Ok(status)
    }
}

impl Backend for GitHubClient {
    type Target = GitHubWorkflow;

    fn kind(&self) -> BackendKind {
        BackendKind::Github
    }

    fn dispatch(&self, target: &GitHubWorkflow) -> Result<Dispatched> {
        self.dispatch_workflow(target)?;
        Ok(Dispatched::Accepted)
    }

    fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    fn resolve_run_id(&self, target: &GitHubWorkflow) -> Result<Option<RunId>> {
        self.latest_run_id(target)
    }

    fn poll(&self, target: &GitHubWorkflow, run: RunId) -> Result<RunStatus> {
        self.run_status(&target.repo, run)
    }
}
