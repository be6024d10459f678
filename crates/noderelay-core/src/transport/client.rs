//! HTTP transport to the runtime.

use super::protocol::{InvocationReply, InvocationWire};
use crate::config::RuntimeConfig;
use crate::error::{RelayError, Result};
use crate::invocation::{InvocationRequest, ModuleSource};
use crate::process::RuntimeProcessHandle;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Sends one dispatch to a runtime process and awaits its reply.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, handle: &RuntimeProcessHandle, request: &InvocationRequest) -> Result<Value>;
}

/// Transport over HTTP, one `POST /invoke` per dispatch.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(RuntimeConfig::USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|e| RelayError::transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn exchange(
        &self,
        handle: &RuntimeProcessHandle,
        request: &InvocationRequest,
    ) -> Result<Value> {
        let body = InvocationWire::from(request);
        let mut builder = self.client.post(handle.invoke_url()).json(&body);
        if let Some(timeout) = request.timeout.as_duration() {
            builder = builder.timeout(timeout);
        }

        debug!(
            "Dispatching invocation {} (attempt {}) to generation {}",
            request.id,
            request.attempt,
            handle.generation()
        );

        let response = builder.send().await.map_err(|e| map_send_error(request, e))?;
        let status = response.status();

        // 404 is the runtime's cache miss; for other sources the body decides
        if status == StatusCode::NOT_FOUND {
            if let ModuleSource::Cache { key } = &request.module_source {
                return Err(RelayError::ModuleNotCached { key: key.clone() });
            }
        }

        let bytes = response.bytes().await.map_err(|e| map_send_error(request, e))?;

        let reply: InvocationReply = match serde_json::from_slice(&bytes) {
            Ok(reply) => reply,
            Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => {
                return Err(RelayError::transport("runtime is shutting down"));
            }
            Err(e) => {
                return Err(RelayError::Protocol {
                    message: format!("unexpected response (HTTP {}): {}", status, e),
                })
            }
        };

        if reply.invocation_id != request.id {
            return Err(RelayError::Protocol {
                message: format!(
                    "reply for invocation {} received on invocation {}",
                    reply.invocation_id, request.id
                ),
            });
        }

        reply.into_result()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, handle: &RuntimeProcessHandle, request: &InvocationRequest) -> Result<Value> {
        if !handle.is_current() {
            return Err(RelayError::StaleGeneration {
                generation: handle.generation(),
            });
        }
        if !handle.is_connected() {
            return Err(RelayError::transport(format!(
                "runtime generation {} is {:?}",
                handle.generation(),
                handle.state()
            )));
        }

        let outcome = tokio::select! {
            result = self.exchange(handle, request) => result,
            _ = handle.wait_down() => Err(RelayError::transport(format!(
                "runtime generation {} went down during invocation",
                handle.generation()
            ))),
        };

        // A transport failure on a superseded generation is a supersession
        match outcome {
            Err(RelayError::TransportUnavailable { .. }) if !handle.is_current() => {
                Err(RelayError::StaleGeneration {
                    generation: handle.generation(),
                })
            }
            other => other,
        }
    }
}

fn map_send_error(request: &InvocationRequest, err: reqwest::Error) -> RelayError {
    match request.timeout.as_duration() {
        Some(timeout) if err.is_timeout() => RelayError::InvocationTimeout(timeout),
        _ => RelayError::from(err),
    }
}
