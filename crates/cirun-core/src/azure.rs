//! Azure Pipelines backend. Creating a run returns its id straight away,
//! so there is no lookup step.

use crate::backend::{Backend, Dispatched};
use crate::config::AzurePipeline;
use crate::error::{CirunError, Result};
use crate::http;
use crate::types::{BackendKind, RunId, RunStatus};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://dev.azure.com";
pub const API_VERSION: &str = "6.0-preview.1";

pub struct AzureClient {
    http: Client,
    base: Url,
    auth_header: String,
}

#[derive(Debug, Deserialize)]
struct PipelineRun {
    id: u64,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    result: Option<String>,
}

/// `completed` + `succeeded` is a pass, any other result of a completed run
/// is a failure, everything else is still running.
pub fn classify(state: Option<&str>, result: Option<&str>) -> RunStatus {
    match (state, result) {
        (Some("completed"), Some("succeeded")) => RunStatus::Succeeded,
        (Some("completed"), _) => RunStatus::Failed,
        _ => RunStatus::Pending,
    }
}

/// Personal access tokens go in as the password of a basic credential with
/// an empty user name.
pub fn basic_auth_header(token: &str) -> String {
    let encoded = BASE64_STANDARD.encode(format!(":{token}"));
    format!("Basic {encoded}")
}

impl AzureClient {
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base: http::parse_base(base_url)?,
            auth_header: basic_auth_header(token),
        })
    }

    fn runs_endpoint(&self, pipeline: &AzurePipeline, run: Option<RunId>) -> Result<Url> {
        let pipeline_id = pipeline.pipeline_id.to_string();
        let run_id = run.map(|r| r.to_string());
        let mut segments = vec![
            pipeline.organization.as_str(),
            pipeline.project.as_str(),
            "_apis",
            "pipelines",
            pipeline_id.as_str(),
            "runs",
        ];
        if let Some(run_id) = run_id.as_deref() {
            segments.push(run_id);
        }
        let mut url = http::endpoint(&self.base, segments)?;
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    /// Queue a run on `refs/heads/{branch}` and return its id. Only `200`
    /// counts as success.
    pub fn run_pipeline(&self, pipeline: &AzurePipeline) -> Result<RunId> {
        let url = self.runs_endpoint(pipeline, None)?;
        let mut body = json!({
            "resources": {
                "repositories": {
                    "self": { "refName": pipeline.ref_name() }
                }
            }
        });
        if !pipeline.parameters.is_empty() {
            body["templateParameters"] = Value::Object(pipeline.parameters.clone());
        }

        info!(
            "Triggering Azure DevOps pipeline {} in {}/{} on branch {}",
            pipeline.pipeline_id, pipeline.organization, pipeline.project, pipeline.branch
        );
        debug!(%url, "POST pipeline run");
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, &self.auth_header)
            .json(&body)
            .send()?;

        match response.status() {
            StatusCode::OK => {
                let run: PipelineRun = response.json()?;
                info!(
                    "Successfully triggered Azure DevOps pipeline {} in {}/{} (run {})",
                    pipeline.pipeline_id, pipeline.organization, pipeline.project, run.id
                );
                Ok(RunId(run.id))
            }
            StatusCode::UNAUTHORIZED => Err(CirunError::Unauthorized {
                target: pipeline.to_string(),
            }),
            status => Err(CirunError::DispatchRejected {
                target: pipeline.to_string(),
                status: status.as_u16(),
                body: http::body_text(response),
            }),
        }
    }

    pub fn run_status(&self, pipeline: &AzurePipeline, run: RunId) -> Result<RunStatus> {
        let url = self.runs_endpoint(pipeline, Some(run))?;
        debug!(%url, "GET pipeline run");
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()?;
        let detail: PipelineRun = http::json_or_status(response)?;
        debug!(
            run = detail.id,
            state = detail.state.as_deref().unwrap_or("unknown"),
            result = detail.result.as_deref().unwrap_or("none"),
            "pipeline run status"
        );
        Ok(classify(detail.state.as_deref(), detail.result.as_deref()))
    }
}

impl Backend for AzureClient {
    type Target = AzurePipeline;

    fn kind(&self) -> BackendKind {
        BackendKind::Azure
    }

    fn dispatch(&self, target: &AzurePipeline) -> Result<Dispatched> {
        self.run_pipeline(target).map(Dispatched::Run)
    }

    fn poll(&self, target: &AzurePipeline, run: RunId) -> Result<RunStatus> {
        self.run_status(target, run)
    }
}
