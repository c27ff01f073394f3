//! Request inputs and response envelopes for the code generation API.
//!
//! # Design
//! A submitted artifact is either a local file or a remote URL, never both,
//! so it is modelled as `Source` instead of paired optional arguments.
//! Response types spell out the fields callers read and keep everything
//! else in a flattened `extra` map, so serializing a parsed response
//! reproduces the server's JSON.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

pub const DEFAULT_INSTRUCTION: &str = "Generate initialization code";

/// Where an artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Read from disk and uploaded as a multipart field.
    LocalFile(PathBuf),
    /// Passed to the server as a URL for it to download.
    RemoteUrl(String),
}

impl Source {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Source::LocalFile(path.into())
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Source::RemoteUrl(url.into())
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Source::RemoteUrl(_))
    }

    /// An empty path or blank URL counts as no source at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Source::LocalFile(path) => path.to_str().map_or(false, |p| p.trim().is_empty()),
            Source::RemoteUrl(url) => url.trim().is_empty(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Source::LocalFile(path) => Some(path),
            Source::RemoteUrl(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Source::LocalFile(_) => None,
            Source::RemoteUrl(url) => Some(url),
        }
    }
}

impl FromStr for Source {
    type Err = ApiError;

    /// `http://` and `https://` values are URLs; anything else is a path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ApiError::InvalidArgument("source must not be empty".to_string()));
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Source::RemoteUrl(s.to_string()))
        } else {
            Ok(Source::LocalFile(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::LocalFile(path) => write!(f, "{}", path.display()),
            Source::RemoteUrl(url) => f.write_str(url),
        }
    }
}

/// The two kinds of document the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Datasheet,
    Schematic,
}

impl Artifact {
    /// Multipart field name for uploads.
    pub fn field_name(self) -> &'static str {
        match self {
            Artifact::Datasheet => "datasheet",
            Artifact::Schematic => "schematic",
        }
    }

    /// JSON key for URL submissions.
    pub fn url_key(self) -> &'static str {
        match self {
            Artifact::Datasheet => "datasheet_url",
            Artifact::Schematic => "schematic_url",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for Artifact {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "datasheet" => Ok(Artifact::Datasheet),
            "schematic" => Ok(Artifact::Schematic),
            other => Err(ApiError::InvalidArgument(format!("unknown artifact {other:?}"))),
        }
    }
}

/// One code generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    instruction: String,
    datasheet: Option<Source>,
    schematic: Option<Source>,
}

impl GenerationRequest {
    /// Fails with `InvalidArgument` unless at least one non-empty source is
    /// given.
    pub fn new(
        instruction: impl Into<String>,
        datasheet: Option<Source>,
        schematic: Option<Source>,
    ) -> Result<Self, ApiError> {
        let datasheet = datasheet.filter(|s| !s.is_empty());
        let schematic = schematic.filter(|s| !s.is_empty());
        if datasheet.is_none() && schematic.is_none() {
            return Err(ApiError::InvalidArgument(
                "at least one datasheet or schematic must be provided".to_string(),
            ));
        }
        Ok(Self {
            instruction: instruction.into(),
            datasheet,
            schematic,
        })
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn datasheet(&self) -> Option<&Source> {
        self.datasheet.as_ref()
    }

    pub fn schematic(&self) -> Option<&Source> {
        self.schematic.as_ref()
    }

    /// Present sources paired with their artifact kind, datasheet first.
    pub fn sources(&self) -> impl Iterator<Item = (Artifact, &Source)> {
        [
            (Artifact::Datasheet, self.datasheet.as_ref()),
            (Artifact::Schematic, self.schematic.as_ref()),
        ]
        .into_iter()
        .filter_map(|(artifact, source)| source.map(|s| (artifact, s)))
    }

    /// URL submission wins as soon as any source is remote.
    pub fn uses_urls(&self) -> bool {
        self.sources().any(|(_, s)| s.is_remote())
    }
}

/// JSON body for `POST /api/v1/generate/url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlGeneration {
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datasheet_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schematic_url: Option<String>,
}

/// `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /api/v1/status`. The `system` block is tool-dependent and left
/// untyped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope returned by the generate endpoints and by task results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GenerationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasheet_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic_analysis: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope returned by the analyze endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lifecycle state of an asynchronous generation task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "processing" => Ok(TaskState::Processing),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            other => Err(ApiError::InvalidArgument(format!("unknown task status {other:?}"))),
        }
    }
}

/// `202 Accepted` reply of `POST /api/v1/generate/async`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAccepted {
    pub status: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    pub percentage: u32,
}

/// `GET /api/v1/tasks/{id}` and the entries of a task listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInfo {
    pub task_id: String,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

/// `GET /api/v1/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskList {
    pub tasks: Vec<TaskInfo>,
    #[serde(default)]
    pub stats: TaskStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskState>,
    pub limit: Option<u32>,
}

/// `DELETE /api/v1/tasks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDeleted {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub task_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_parses_urls_and_paths() {
        assert_eq!(
            "https://example.com/ds.pdf".parse::<Source>().unwrap(),
            Source::remote("https://example.com/ds.pdf")
        );
        assert_eq!(
            "HTTP://example.com/a.png".parse::<Source>().unwrap(),
            Source::remote("HTTP://example.com/a.png")
        );
        assert_eq!(
            "boards/stm32.pdf".parse::<Source>().unwrap(),
            Source::local("boards/stm32.pdf")
        );
        assert!(matches!(
            "   ".parse::<Source>(),
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn request_without_sources_is_rejected() {
        let err = GenerationRequest::new("init", None, None).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn empty_sources_count_as_missing() {
        let err = GenerationRequest::new(
            "init",
            Some(Source::local("")),
            Some(Source::remote("  ")),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));

        let err = GenerationRequest::new("init", Some(Source::local("   ")), None).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
        assert!(Source::local(" \t").is_empty());
        assert!(!Source::local("board.png").is_empty());
    }

    #[test]
    fn single_source_is_enough() {
        let req = GenerationRequest::new("init", None, Some(Source::local("s.png"))).unwrap();
        assert!(req.datasheet().is_none());
        assert_eq!(req.schematic(), Some(&Source::local("s.png")));
        assert!(!req.uses_urls());
    }

    #[test]
    fn any_remote_source_selects_url_mode() {
        let req = GenerationRequest::new(
            "init",
            Some(Source::local("d.pdf")),
            Some(Source::remote("https://x/s.png")),
        )
        .unwrap();
        assert!(req.uses_urls());
        let kinds: Vec<Artifact> = req.sources().map(|(a, _)| a).collect();
        assert_eq!(kinds, vec![Artifact::Datasheet, Artifact::Schematic]);
    }

    #[test]
    fn url_generation_omits_absent_urls() {
        let body = UrlGeneration {
            instruction: "init".to_string(),
            datasheet_url: Some("https://x/ds.pdf".to_string()),
            schematic_url: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"instruction": "init", "datasheet_url": "https://x/ds.pdf"})
        );
    }

    #[test]
    fn generation_response_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "status": "success",
            "generated_code": "void f(){}",
            "metadata": {
                "processing_time_ms": 12,
                "output_filename": "generated_1.c",
                "datasheet_analysis": {"registers": []}
            },
            "timestamp": "2024-01-15T10:30:45.123Z"
        });
        let parsed: GenerationResponse = serde_json::from_value(raw.clone()).unwrap();
        assert!(parsed.is_success());
        let metadata = parsed.metadata.as_ref().unwrap();
        assert_eq!(metadata.processing_time_ms, Some(12));
        assert_eq!(metadata.extra["output_filename"], "generated_1.c");
        assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
    }

    #[test]
    fn task_info_reads_lowercase_status() {
        let info: TaskInfo = serde_json::from_str(
            r#"{"task_id":"task_1","status":"processing","progress":{"current_step":1,"total_steps":3,"step_name":"Parsing datasheet","percentage":33}}"#,
        )
        .unwrap();
        assert_eq!(info.status, TaskState::Processing);
        assert_eq!(info.progress.unwrap().percentage, 33);
        assert!(!info.status.is_finished());
    }

    #[test]
    fn artifact_names_match_wire_fields() {
        assert_eq!(Artifact::Datasheet.field_name(), "datasheet");
        assert_eq!(Artifact::Schematic.url_key(), "schematic_url");
        assert_eq!("Schematic".parse::<Artifact>().unwrap(), Artifact::Schematic);
    }
}
