//! Blocking client for the code generation service.
//!
//! Each method validates its arguments, builds the request with
//! `CodegenClient`, sends it through the `Transport` and parses the reply.
//! Nothing is retried; the first failure is returned as-is.

use serde_json::Value;

use crate::client::CodegenClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    AnalysisResponse, Artifact, GenerationRequest, GenerationResponse, HealthReport, Source,
    StatusReport, TaskAccepted, TaskDeleted, TaskFilter, TaskInfo, TaskList,
};

#[derive(Debug, Clone)]
pub struct BlockingClient<T = UreqTransport> {
    requests: CodegenClient,
    transport: T,
}

impl BlockingClient<UreqTransport> {
    /// Client over ureq, using the timeout from `config`.
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> BlockingClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            requests: CodegenClient::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.requests.config()
    }

    pub fn health_check(&self) -> Result<HealthReport, ApiError> {
        self.send(self.requests.build_health_check())
    }

    pub fn get_status(&self) -> Result<StatusReport, ApiError> {
        self.send(self.requests.build_get_status())
    }

    /// The docs payload is free-form and returned untouched.
    pub fn get_docs(&self) -> Result<Value, ApiError> {
        self.send(self.requests.build_get_docs())
    }

    pub fn generate_code(&self, request: &GenerationRequest) -> Result<GenerationResponse, ApiError> {
        self.send(self.requests.build_generate(request)?)
    }

    /// Queue a generation on the server and return its task handle.
    pub fn generate_code_async(&self, request: &GenerationRequest) -> Result<TaskAccepted, ApiError> {
        self.send(self.requests.build_generate_async(request)?)
    }

    pub fn analyze_datasheet(&self, source: &Source) -> Result<AnalysisResponse, ApiError> {
        self.analyze(Artifact::Datasheet, source)
    }

    pub fn analyze_schematic(&self, source: &Source) -> Result<AnalysisResponse, ApiError> {
        self.analyze(Artifact::Schematic, source)
    }

    pub fn analyze(&self, artifact: Artifact, source: &Source) -> Result<AnalysisResponse, ApiError> {
        self.send(self.requests.build_analyze(artifact, source)?)
    }

    pub fn get_task(&self, task_id: &str) -> Result<TaskInfo, ApiError> {
        self.send(self.requests.build_get_task(task_id)?)
    }

    /// Fetch the generated code of a finished task. The server answers 425
    /// while the task is still running, which surfaces as `HttpError`.
    pub fn get_task_result(&self, task_id: &str) -> Result<GenerationResponse, ApiError> {
        self.send(self.requests.build_get_task_result(task_id)?)
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskList, ApiError> {
        self.send(self.requests.build_list_tasks(filter))
    }

    pub fn delete_task(&self, task_id: &str) -> Result<TaskDeleted, ApiError> {
        self.send(self.requests.build_delete_task(task_id)?)
    }

    fn send<R: serde::de::DeserializeOwned>(&self, request: HttpRequest) -> Result<R, ApiError> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "sending request");
        let response = self.transport.execute(request)?;
        self.requests.parse_json(response)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use tracing_test::traced_test;

    use super::*;
    use crate::http::{HttpMethod, HttpResponse};

    /// Records every request and answers from a queue of canned results.
    #[derive(Default)]
    struct ScriptedTransport {
        sent: RefCell<Vec<HttpRequest>>,
        replies: RefCell<VecDeque<Result<HttpResponse, ApiError>>>,
    }

    impl ScriptedTransport {
        fn replying(status: u16, body: &str) -> Self {
            let transport = Self::default();
            transport.push(status, body);
            transport
        }

        fn push(&self, status: u16, body: &str) {
            self.replies.borrow_mut().push_back(Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }));
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.sent.borrow_mut().push(request);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Connection("no scripted reply".to_string())))
        }
    }

    fn client(transport: &ScriptedTransport) -> BlockingClient<&ScriptedTransport> {
        BlockingClient::with_transport(ClientConfig::new("http://svc"), transport)
    }

    #[test]
    fn generate_returns_envelope_unchanged() {
        let transport =
            ScriptedTransport::replying(200, r#"{"status":"success","generated_code":"void f(){}"}"#);
        let request =
            GenerationRequest::new("init", Some(Source::remote("https://x/ds.pdf")), None).unwrap();
        let result = client(&transport).generate_code(&request).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"status": "success", "generated_code": "void f(){}"})
        );
        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "http://svc/api/v1/generate/url");
    }

    #[test]
    fn missing_upload_sends_nothing() {
        let transport = ScriptedTransport::default();
        let request =
            GenerationRequest::new("init", Some(Source::local("/no/such/file.pdf")), None).unwrap();
        let err = client(&transport).generate_code(&request).unwrap_err();
        assert!(matches!(err, ApiError::FileRead { .. }));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn analyze_with_empty_source_sends_nothing() {
        let transport = ScriptedTransport::default();
        let c = client(&transport);
        assert!(matches!(
            c.analyze_datasheet(&Source::remote("")),
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            c.analyze_schematic(&Source::local("")),
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn transport_errors_propagate_unchanged() {
        let transport = ScriptedTransport::default();
        transport.replies.borrow_mut().push_back(Err(ApiError::Timeout));
        let err = client(&transport).health_check().unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    fn server_errors_carry_status_and_body() {
        let transport = ScriptedTransport::replying(503, r#"{"status":"error","message":"busy"}"#);
        let err = client(&transport).get_status().unwrap_err();
        match err {
            ApiError::HttpError { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("busy"));
            }
            other => panic!("expected HttpError, got {other:?}"),
        }
    }

    #[test]
    fn task_calls_hit_task_paths() {
        let transport = ScriptedTransport::default();
        transport.push(200, r#"{"task_id":"t1","status":"pending"}"#);
        transport.push(200, r#"{"tasks":[],"stats":{"total":0}}"#);
        transport.push(200, r#"{"status":"success","message":"Task deleted","task_id":"t1"}"#);
        let c = client(&transport);

        assert_eq!(c.get_task("t1").unwrap().task_id, "t1");
        assert!(c.list_tasks(&TaskFilter::default()).unwrap().tasks.is_empty());
        assert_eq!(c.delete_task("t1").unwrap().task_id, "t1");

        let urls: Vec<String> = transport.sent.borrow().iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "http://svc/api/v1/tasks/t1",
                "http://svc/api/v1/tasks",
                "http://svc/api/v1/tasks/t1",
            ]
        );
    }

    #[test]
    #[traced_test]
    fn dropped_local_file_is_logged() {
        let transport = ScriptedTransport::replying(200, r#"{"status":"success"}"#);
        let request = GenerationRequest::new(
            "init",
            Some(Source::local("local.pdf")),
            Some(Source::remote("https://x/s.png")),
        )
        .unwrap();
        client(&transport).generate_code(&request).unwrap();
        assert!(logs_contain("local file is not uploaded"));
        assert!(logs_contain("local.pdf"));
    }
}
