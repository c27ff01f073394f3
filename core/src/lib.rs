//! Blocking client SDK for the Embedded AI code generation service.
//!
//! # Overview
//! Submits datasheets and schematics, either uploaded from disk or passed
//! as URLs, and returns the service's JSON replies as typed values. A
//! separate `ChatRelay` forwards queries to a chat-completion endpoint.
//!
//! # Design
//! - `CodegenClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network (host-does-IO pattern).
//! - `Transport` performs the round-trip; `UreqTransport` is the blocking
//!   implementation used by `BlockingClient`.
//! - `Source` is either a local file or a remote URL, so one artifact can
//!   never carry both.
//! - Every failure is an `ApiError`; nothing is retried.

pub mod blocking;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod transport;
pub mod types;

pub use blocking::BlockingClient;
pub use chat::{ChatConfig, ChatRelay};
pub use client::CodegenClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{
    AnalysisResponse, Artifact, GenerationMetadata, GenerationRequest, GenerationResponse,
    HealthReport, Source, StatusReport, TaskAccepted, TaskDeleted, TaskFilter, TaskInfo, TaskList,
    TaskProgress, TaskState, TaskStats, DEFAULT_INSTRUCTION,
};
