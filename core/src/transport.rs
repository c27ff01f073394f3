//! Executes `HttpRequest` values over the network.
//!
//! # Design
//! `Transport` is the I/O seam between the pure request builder and the
//! outside world. `UreqTransport` is the production implementation: one
//! blocking request at a time on a reusable `ureq::Agent`, with the
//! configured timeout covering the whole exchange. Non-2xx statuses come
//! back as data so `CodegenClient::parse_json` decides what they mean.

use std::time::Duration;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let result = match method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&url);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Delete => {
                let mut builder = self.agent.delete(&url);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&url);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match body {
                    Some(bytes) => builder.send(&bytes[..]),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // Non-UTF-8 bodies are decoded lossily.
        let bytes = response.body_mut().read_to_vec().map_err(classify)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        tracing::debug!(method = method.as_str(), %url, status, "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sort a ureq failure into the client's error taxonomy.
fn classify(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Timeout(_) => ApiError::Timeout,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => ApiError::Timeout,
        ureq::Error::Io(io) => ApiError::Connection(io.to_string()),
        ureq::Error::HostNotFound => ApiError::Connection("host not found".to_string()),
        ureq::Error::ConnectionFailed => ApiError::Connection("connection failed".to_string()),
        ureq::Error::BadUri(uri) => ApiError::InvalidArgument(format!("bad URL: {uri}")),
        other => ApiError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_classified() {
        let err = classify(ureq::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow",
        )));
        assert!(matches!(err, ApiError::Timeout));
    }

    #[test]
    fn refused_connections_are_classified() {
        let err = classify(ureq::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(matches!(err, ApiError::Connection(_)));
        assert!(matches!(classify(ureq::Error::HostNotFound), ApiError::Connection(_)));
    }

    #[test]
    fn bad_uris_are_invalid_arguments() {
        let err = classify(ureq::Error::BadUri("::".to_string()));
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }
}
