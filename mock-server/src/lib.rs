use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const API_PREFIX: &str = "/api/v1";
pub const VERSION: &str = "1.0.0";

/// Knobs for simulating server behavior in tests.
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Require this value in `X-API-Key` on `/api` routes.
    pub api_key: Option<String>,
    /// Require `Authorization: Bearer <token>` on the chat route.
    pub chat_token: Option<String>,
    /// Sleep before answering any request.
    pub delay: Option<Duration>,
    /// Answer every request with this status and a plain-text body.
    pub fail_status: Option<u16>,
    /// Answer every request with 200 and a body that is not JSON.
    pub malformed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub api_key: Option<String>,
}

/// Shared record of every request the mock has seen.
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<RecordedRequest>>>);

impl RequestLog {
    pub fn entries(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries().into_iter().map(|r| r.path).collect()
    }

    fn push(&self, request: RecordedRequest) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(request);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
}

#[derive(Clone, Debug)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub instruction: String,
    pub sources: Vec<String>,
    pub created_at: u64,
}

pub type Db = Arc<RwLock<HashMap<String, Task>>>;

#[derive(Clone)]
struct AppState {
    options: Arc<MockOptions>,
    log: RequestLog,
    tasks: Db,
    started: Instant,
}

pub fn app() -> Router {
    app_with(MockOptions::default(), RequestLog::default())
}

pub fn app_with(options: MockOptions, log: RequestLog) -> Router {
    let state = AppState {
        options: Arc::new(options),
        log,
        tasks: Arc::new(RwLock::new(HashMap::new())),
        started: Instant::now(),
    };
    let api = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/docs", get(docs))
        .route("/generate", post(generate_upload))
        .route("/generate/url", post(generate_url))
        .route("/generate/async", post(generate_async))
        .route("/analyze/datasheet", post(analyze_datasheet))
        .route("/analyze/schematic", post(analyze_schematic))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
        .route("/tasks/{id}/result", get(task_result));

    Router::new()
        .nest(API_PREFIX, api)
        .route("/v1/chat-messages", post(chat))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), gate))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(
    listener: TcpListener,
    options: MockOptions,
    log: RequestLog,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(options, log)).await
}

/// Records the request, then applies the configured failure modes.
async fn gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (recorded, bearer) = {
        let header_value = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let recorded = RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            content_type: header_value(header::CONTENT_TYPE.as_str()),
            api_key: header_value("x-api-key"),
        };
        (recorded, header_value(header::AUTHORIZATION.as_str()))
    };
    let path = recorded.path.clone();
    let api_key = recorded.api_key.clone();
    tracing::debug!(method = %recorded.method, %path, "mock request");
    state.log.push(recorded);

    if let Some(delay) = state.options.delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(code) = state.options.fail_status {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "simulated failure").into_response();
    }
    if state.options.malformed {
        return (StatusCode::OK, "<html>not json</html>").into_response();
    }
    if path.starts_with(API_PREFIX) {
        if let Some(expected) = &state.options.api_key {
            if api_key.as_deref() != Some(expected.as_str()) {
                return error(StatusCode::UNAUTHORIZED, "invalid or missing API key");
            }
        }
    }
    if path == "/v1/chat-messages" {
        if let Some(token) = &state.options.chat_token {
            if bearer.as_deref() != Some(format!("Bearer {token}").as_str()) {
                return error(StatusCode::UNAUTHORIZED, "invalid bearer token");
            }
        }
    }
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn render_code(instruction: &str, sources: &[String]) -> String {
    format!(
        "/* {instruction} */\n/* sources: {} */\nvoid board_init(void)\n{{\n}}\n",
        sources.join(", ")
    )
}

async fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "endpoint not found")
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "Embedded AI Code Generator",
        "version": VERSION,
        "timestamp": now_secs().to_string(),
        "uptime": state.started.elapsed().as_secs_f64(),
    }))
}

async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "system": {
            "qwen_api": "configured",
            "pdf_converter": { "imagemagick": false, "ghostscript": false, "available": false },
            "platform": std::env::consts::OS,
        },
        "timestamp": now_secs().to_string(),
    }))
}

async fn docs() -> Json<Value> {
    let endpoint = |method: &str, path: &str, description: &str| {
        json!({ "method": method, "path": format!("{API_PREFIX}{path}"), "description": description })
    };
    Json(json!({
        "service": "Embedded AI Code Generator API",
        "version": VERSION,
        "endpoints": [
            endpoint("GET", "/health", "Health check"),
            endpoint("GET", "/status", "System status"),
            endpoint("POST", "/generate", "Generate code from uploaded files"),
            endpoint("POST", "/generate/url", "Generate code from URLs"),
            endpoint("POST", "/generate/async", "Queue a generation task"),
            endpoint("POST", "/analyze/datasheet", "Analyze a datasheet"),
            endpoint("POST", "/analyze/schematic", "Analyze a schematic"),
            endpoint("GET", "/tasks", "List tasks"),
            endpoint("GET", "/tasks/{id}", "Task status"),
            endpoint("GET", "/tasks/{id}/result", "Task result"),
            endpoint("DELETE", "/tasks/{id}", "Delete a task"),
        ],
    }))
}

#[derive(Debug, Default)]
struct Upload {
    files: Vec<(String, String, usize)>,
    instruction: Option<String>,
}

impl Upload {
    fn file(&self, field: &str) -> Option<(&str, usize)> {
        self.files
            .iter()
            .find(|(name, _, _)| name == field)
            .map(|(_, filename, size)| (filename.as_str(), *size))
    }

    fn filenames(&self) -> Vec<String> {
        self.files.iter().map(|(_, filename, _)| filename.clone()).collect()
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, Response> {
    let mut upload = Upload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(error(StatusCode::BAD_REQUEST, &e.to_string())),
        };
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))?;
        match filename {
            Some(filename) if name == "datasheet" || name == "schematic" => {
                upload.files.push((name, filename, data.len()))
            }
            None if name == "instruction" => {
                upload.instruction = Some(String::from_utf8_lossy(&data).into_owned())
            }
            _ => {}
        }
    }
    Ok(upload)
}

fn validate_upload(upload: &Upload) -> Result<String, Response> {
    if upload.files.is_empty() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "at least one datasheet or schematic file is required",
        ));
    }
    match upload.instruction.as_deref() {
        Some(instruction) if !instruction.is_empty() => Ok(instruction.to_string()),
        _ => Err(error(StatusCode::BAD_REQUEST, "missing instruction")),
    }
}

async fn generate_upload(multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };
    let instruction = match validate_upload(&upload) {
        Ok(instruction) => instruction,
        Err(response) => return response,
    };
    let datasheet = upload.file("datasheet");
    let schematic = upload.file("schematic");
    Json(json!({
        "status": "success",
        "generated_code": render_code(&instruction, &upload.filenames()),
        "metadata": {
            "datasheet_name": datasheet.map(|(n, _)| n),
            "datasheet_size": datasheet.map(|(_, s)| s),
            "schematic_name": schematic.map(|(n, _)| n),
            "schematic_size": schematic.map(|(_, s)| s),
            "instruction": instruction,
            "processing_time_ms": 0,
        },
    }))
    .into_response()
}

#[derive(Deserialize)]
pub struct UrlGeneration {
    pub instruction: Option<String>,
    pub datasheet_url: Option<String>,
    pub schematic_url: Option<String>,
}

async fn generate_url(Json(input): Json<UrlGeneration>) -> Response {
    if input.datasheet_url.is_none() && input.schematic_url.is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            "at least one datasheet_url or schematic_url is required",
        );
    }
    let Some(instruction) = input.instruction.filter(|i| !i.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "missing instruction");
    };
    let sources: Vec<String> = [&input.datasheet_url, &input.schematic_url]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    Json(json!({
        "status": "success",
        "generated_code": render_code(&instruction, &sources),
        "metadata": {
            "datasheet_url": input.datasheet_url,
            "schematic_url": input.schematic_url,
            "instruction": instruction,
            "processing_time_ms": 0,
        },
    }))
    .into_response()
}

async fn generate_async(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };
    let instruction = match validate_upload(&upload) {
        Ok(instruction) => instruction,
        Err(response) => return response,
    };
    let task = Task {
        task_id: format!("task_{}", Uuid::new_v4().simple()),
        status: TaskStatus::Pending,
        instruction,
        sources: upload.filenames(),
        created_at: now_secs(),
    };
    let task_id = task.task_id.clone();
    state.tasks.write().await.insert(task_id.clone(), task);
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "task_id": task_id,
            "message": "Task accepted and queued for processing",
            "estimated_time": "60-180 seconds",
            "poll_url": format!("{API_PREFIX}/tasks/{task_id}"),
            "result_url": format!("{API_PREFIX}/tasks/{task_id}/result"),
        })),
    )
        .into_response()
}

fn task_json(task: &Task) -> Value {
    let (step, name, percentage) = match task.status {
        TaskStatus::Pending => (0, "Initializing", 0),
        TaskStatus::Processing => (1, "Parsing datasheet", 33),
        TaskStatus::Completed => (3, "Completed", 100),
    };
    let mut info = json!({
        "task_id": task.task_id,
        "status": task.status,
        "progress": {
            "current_step": step,
            "total_steps": 3,
            "step_name": name,
            "percentage": percentage,
        },
        "created_at": task.created_at.to_string(),
    });
    if task.status == TaskStatus::Completed {
        info["result_available"] = json!(true);
        info["result_url"] = json!(format!("{API_PREFIX}/tasks/{}/result", task.task_id));
    }
    info
}

/// Each poll moves the task one step closer to completion.
async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut tasks = state.tasks.write().await;
    let Some(task) = tasks.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Task not found");
    };
    let info = task_json(task);
    task.status = match task.status {
        TaskStatus::Pending => TaskStatus::Processing,
        _ => TaskStatus::Completed,
    };
    Json(info).into_response()
}

async fn task_result(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let tasks = state.tasks.read().await;
    let Some(task) = tasks.get(&id) else {
        return error(StatusCode::NOT_FOUND, "Task not found");
    };
    if task.status != TaskStatus::Completed {
        return (
            StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT),
            Json(json!({
                "status": "error",
                "message": "Task not yet completed",
                "task_status": task.status,
                "retry_after": 10,
            })),
        )
            .into_response();
    }
    Json(json!({
        "status": "success",
        "task_id": task.task_id,
        "generated_code": render_code(&task.instruction, &task.sources),
        "metadata": { "processing_time_ms": 0 },
    }))
    .into_response()
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

async fn list_tasks(State(state): State<AppState>, Query(params): Query<ListParams>) -> Json<Value> {
    let tasks = state.tasks.read().await;
    let count = |status: TaskStatus| tasks.values().filter(|t| t.status == status).count();
    let mut selected: Vec<&Task> = tasks
        .values()
        .filter(|t| params.status.map_or(true, |s| t.status == s))
        .collect();
    selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.task_id.cmp(&b.task_id)));
    selected.truncate(params.limit.unwrap_or(20));
    Json(json!({
        "tasks": selected.into_iter().map(task_json).collect::<Vec<_>>(),
        "stats": {
            "total": tasks.len(),
            "pending": count(TaskStatus::Pending),
            "processing": count(TaskStatus::Processing),
            "completed": count(TaskStatus::Completed),
            "failed": 0,
        },
        "timestamp": now_secs().to_string(),
    }))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.tasks.write().await.remove(&id) {
        Some(_) => Json(json!({
            "status": "success",
            "message": "Task deleted",
            "task_id": id,
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn analyze_datasheet(request: Request) -> Response {
    analyze("datasheet", request).await
}

async fn analyze_schematic(request: Request) -> Response {
    analyze("schematic", request).await
}

/// Accepts the artifact either as an upload or as `{"<artifact>_url": ..}`.
async fn analyze(artifact: &str, request: Request) -> Response {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let source = if is_json {
        let Json(body) = match Json::<Value>::from_request(request, &()).await {
            Ok(body) => body,
            Err(rejection) => return rejection.into_response(),
        };
        match body.get(format!("{artifact}_url")).and_then(Value::as_str) {
            Some(url) => json!({ "url": url }),
            None => return error(StatusCode::BAD_REQUEST, &format!("missing {artifact}_url")),
        }
    } else {
        let multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(rejection) => return rejection.into_response(),
        };
        let upload = match read_upload(multipart).await {
            Ok(upload) => upload,
            Err(response) => return response,
        };
        match upload.file(artifact) {
            Some((filename, size)) => json!({ "file": filename, "size": size }),
            None => return error(StatusCode::BAD_REQUEST, &format!("missing {artifact} file")),
        }
    };

    Json(json!({
        "status": "success",
        "data": { "artifact": artifact, "source": source },
        "timestamp": now_secs().to_string(),
    }))
    .into_response()
}

#[derive(Deserialize)]
pub struct ChatMessage {
    pub query: String,
    #[serde(default)]
    pub user: String,
}

async fn chat(Json(message): Json<ChatMessage>) -> Json<Value> {
    Json(json!({
        "answer": format!("echo: {}", message.query),
        "conversation_id": "mock-conversation",
        "user": message.user,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: TaskStatus) -> Task {
        Task {
            task_id: "task_1".to_string(),
            status,
            instruction: "init".to_string(),
            sources: vec!["ds.pdf".to_string()],
            created_at: 0,
        }
    }

    #[test]
    fn task_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(TaskStatus::Processing).unwrap(), "processing");
    }

    #[test]
    fn completed_task_advertises_result() {
        let info = task_json(&task(TaskStatus::Completed));
        assert_eq!(info["result_available"], true);
        assert_eq!(info["result_url"], "/api/v1/tasks/task_1/result");
        assert_eq!(info["progress"]["percentage"], 100);
    }

    #[test]
    fn pending_task_has_no_result_url() {
        let info = task_json(&task(TaskStatus::Pending));
        assert!(info.get("result_url").is_none());
        assert_eq!(info["progress"]["current_step"], 0);
    }

    #[test]
    fn rendered_code_mentions_instruction_and_sources() {
        let code = render_code("init GPIO", &["ds.pdf".to_string(), "sch.png".to_string()]);
        assert!(code.contains("/* init GPIO */"));
        assert!(code.contains("ds.pdf, sch.png"));
        assert!(code.contains("void board_init(void)"));
    }

    #[test]
    fn url_generation_fields_are_optional() {
        let input: UrlGeneration = serde_json::from_str(r#"{"instruction":"x"}"#).unwrap();
        assert!(input.datasheet_url.is_none());
        assert!(input.schematic_url.is_none());
    }

    #[test]
    fn request_log_is_shared_between_clones() {
        let log = RequestLog::default();
        log.clone().push(RecordedRequest {
            method: "GET".to_string(),
            path: "/api/v1/health".to_string(),
            content_type: None,
            api_key: None,
        });
        assert_eq!(log.paths(), vec!["/api/v1/health"]);
    }
}
