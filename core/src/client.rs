//! Stateless HTTP request builder and response parser for the code
//! generation API.
//!
//! # Design
//! `CodegenClient` holds only the immutable `ClientConfig`. Each endpoint is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_json` call that consumes the `HttpResponse`. The caller executes
//! the round-trip in between, so the submission-mode rules and payload
//! encoding are testable without a network.
//!
//! Upload builders read each local file into memory inside the call. The
//! file handle is dropped before the builder returns, whether the read
//! succeeded or not, so a built request never owns an open file.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::MultipartForm;
use crate::types::{Artifact, GenerationRequest, Source, TaskFilter, UrlGeneration};

pub const API_PREFIX: &str = "/api/v1";
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub struct CodegenClient {
    config: ClientConfig,
}

impl CodegenClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build_health_check(&self) -> HttpRequest {
        self.get("/health")
    }

    pub fn build_get_status(&self) -> HttpRequest {
        self.get("/status")
    }

    pub fn build_get_docs(&self) -> HttpRequest {
        self.get("/docs")
    }

    /// Build the request for a synchronous generation.
    ///
    /// Any remote source switches the whole request to JSON on
    /// `/generate/url`; local sources in that request are not sent.
    pub fn build_generate(&self, request: &GenerationRequest) -> Result<HttpRequest, ApiError> {
        if request.uses_urls() {
            for (artifact, source) in request.sources() {
                if let Source::LocalFile(path) = source {
                    tracing::warn!(
                        artifact = %artifact,
                        path = %path.display(),
                        "URL submission selected; local file is not uploaded"
                    );
                }
            }
            let body = UrlGeneration {
                instruction: request.instruction().to_string(),
                datasheet_url: request.datasheet().and_then(Source::as_url).map(str::to_string),
                schematic_url: request.schematic().and_then(Source::as_url).map(str::to_string),
            };
            return self.post_json("/generate/url", &body);
        }
        let form = self.upload_form(request)?;
        Ok(self.post_form("/generate", form))
    }

    /// Build the request for an asynchronous generation. The async endpoint
    /// only accepts uploads.
    pub fn build_generate_async(&self, request: &GenerationRequest) -> Result<HttpRequest, ApiError> {
        if request.uses_urls() {
            return Err(ApiError::InvalidArgument(
                "asynchronous generation only accepts local files".to_string(),
            ));
        }
        let form = self.upload_form(request)?;
        Ok(self.post_form("/generate/async", form))
    }

    pub fn build_analyze(&self, artifact: Artifact, source: &Source) -> Result<HttpRequest, ApiError> {
        if source.is_empty() {
            return Err(ApiError::InvalidArgument(format!(
                "a {artifact} file path or URL must be provided"
            )));
        }
        let path = format!("/analyze/{}", artifact.field_name());
        match source {
            Source::RemoteUrl(url) => {
                let mut body = serde_json::Map::new();
                body.insert(artifact.url_key().to_string(), url.clone().into());
                self.post_json(&path, &body)
            }
            Source::LocalFile(file) => {
                let (filename, bytes) = read_upload(file)?;
                let form = MultipartForm::new().file(artifact.field_name(), &filename, bytes);
                Ok(self.post_form(&path, form))
            }
        }
    }

    pub fn build_get_task(&self, task_id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.get(&format!("/tasks/{}", checked_task_id(task_id)?)))
    }

    pub fn build_get_task_result(&self, task_id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.get(&format!("/tasks/{}/result", checked_task_id(task_id)?)))
    }

    pub fn build_list_tasks(&self, filter: &TaskFilter) -> HttpRequest {
        let mut query = Vec::new();
        if let Some(status) = filter.status {
            query.push(format!("status={status}"));
        }
        if let Some(limit) = filter.limit {
            query.push(format!("limit={limit}"));
        }
        if query.is_empty() {
            self.get("/tasks")
        } else {
            self.get(&format!("/tasks?{}", query.join("&")))
        }
    }

    pub fn build_delete_task(&self, task_id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(
            HttpMethod::Delete,
            &format!("/tasks/{}", checked_task_id(task_id)?),
        ))
    }

    /// Check the status and decode the JSON body.
    pub fn parse_json<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response)?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    fn upload_form(&self, request: &GenerationRequest) -> Result<MultipartForm, ApiError> {
        let mut form = MultipartForm::new();
        for (artifact, source) in request.sources() {
            if let Source::LocalFile(path) = source {
                let (filename, bytes) = read_upload(path)?;
                form = form.file(artifact.field_name(), &filename, bytes);
            }
        }
        Ok(form.text("instruction", request.instruction()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.config.base_url())
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if let Some(key) = self.config.api_key() {
            headers.push((API_KEY_HEADER.to_string(), key.to_string()));
        }
        HttpRequest {
            method,
            url: self.url(path),
            headers,
            body: None,
        }
    }

    fn get(&self, path: &str) -> HttpRequest {
        self.request(HttpMethod::Get, path)
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_vec(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(HttpMethod::Post, path);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }

    fn post_form(&self, path: &str, form: MultipartForm) -> HttpRequest {
        let mut req = self.request(HttpMethod::Post, path);
        req.headers.push(("content-type".to_string(), form.content_type()));
        req.body = Some(form.encode());
        req
    }
}

/// Read an upload into memory. The file is closed when this returns.
fn read_upload(path: &Path) -> Result<(String, Vec<u8>), ApiError> {
    let bytes = std::fs::read(path).map_err(|source| ApiError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok((filename, bytes))
}

fn checked_task_id(task_id: &str) -> Result<&str, ApiError> {
    let valid = !task_id.is_empty()
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(task_id)
    } else {
        Err(ApiError::InvalidArgument(format!("invalid task id {task_id:?}")))
    }
}

/// Map non-success status codes to `ApiError::HttpError`.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
