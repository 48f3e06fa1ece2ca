use crate::error::{CirunError, Result};
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The parsed workflow file. Entries keep file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub workflows: Vec<WorkflowEntry>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    workflows: Vec<Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CirunError::InvalidConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&data).map_err(|e| match e {
            CirunError::Json(e) => CirunError::InvalidConfig {
                path: path.display().to_string(),
                message: e.to_string(),
            },
            other => other,
        })
    }

    /// Parse every entry up front so a malformed entry is reported before
    /// anything is dispatched.
    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(data)?;
        let mut workflows = Vec::with_capacity(raw.workflows.len());
        for (index, value) in raw.workflows.into_iter().enumerate() {
            let entry: WorkflowEntry =
                serde_json::from_value(value).map_err(|e| CirunError::MalformedEntry {
                    index,
                    message: e.to_string(),
                })?;
            entry
                .validate()
                .map_err(|message| CirunError::MalformedEntry { index, message })?;
            workflows.push(entry);
        }
        Ok(Config { workflows })
    }

    pub fn enabled_count(&self) -> usize {
        self.workflows.iter().filter(|w| w.enabled).count()
    }
}

// ---------------------------------------------------------------------------
// WorkflowEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    /// Optional display label; defaults to a description of the target.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub target: Target,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowEntry {
    pub fn kind(&self) -> BackendKind {
        self.target.kind()
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.target.to_string(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match &self.target {
            Target::Github(wf) => {
                let mut parts = wf.repo.split('/');
                let valid = matches!(
                    (parts.next(), parts.next(), parts.next()),
                    (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
                );
                if !valid {
                    return Err(format!("repo '{}' must be in owner/name form", wf.repo));
                }
                if let WorkflowId::File(file) = &wf.workflow {
                    if file.trim().is_empty() {
                        return Err("workflow must not be empty".to_string());
                    }
                }
                if wf.git_ref.trim().is_empty() {
                    return Err("ref must not be empty".to_string());
                }
            }
            Target::Azure(p) => {
                if p.organization.trim().is_empty() {
                    return Err("organization must not be empty".to_string());
                }
                if p.project.trim().is_empty() {
                    return Err("project must not be empty".to_string());
                }
                if p.branch.trim().is_empty() {
                    return Err("branch must not be empty".to_string());
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Github(GitHubWorkflow),
    Azure(AzurePipeline),
}

impl Target {
    pub fn kind(&self) -> BackendKind {
        match self {
            Target::Github(_) => BackendKind::Github,
            Target::Azure(_) => BackendKind::Azure,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Github(wf) => write!(f, "{wf}"),
            Target::Azure(p) => write!(f, "{p}"),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubWorkflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubWorkflow {
    /// `owner/name`
    pub repo: String,
    pub workflow: WorkflowId,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    /// Forwarded as `workflow_dispatch` inputs.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
}

fn default_ref() -> String {
    "main".to_string()
}

impl fmt::Display for GitHubWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow {} in {}", self.workflow, self.repo)
    }
}

/// A workflow is addressed either by its file name or its numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowId {
    Id(u64),
    File(String),
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowId::Id(id) => write!(f, "{id}"),
            WorkflowId::File(file) => f.write_str(file),
        }
    }
}

// ---------------------------------------------------------------------------
// AzurePipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzurePipeline {
    pub organization: String,
    pub project: String,
    pub pipeline_id: u64,
    #[serde(default = "default_ref")]
    pub branch: String,
    /// Forwarded as `templateParameters`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl AzurePipeline {
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

impl fmt::Display for AzurePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Azure DevOps pipeline {} in {}/{}",
            self.pipeline_id, self.organization, self.project
        )
    }
}
