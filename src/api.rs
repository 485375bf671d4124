use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::config::Endpoints;
use crate::error::{ApiError, ApiResult};
use crate::state::{
    ChatReply, ChatRequest, Connectivity, ExecutionRequest, ExecutionResult, KnowledgeDocument,
    SubmissionReport,
};

/// Everything the console needs from the backend.
///
/// Controllers only see this trait, so tests can swap in an in-memory fake.
#[async_trait]
pub trait LabApi: Send + Sync {
    /// Never fails: unreachable or unhealthy backends report `Disconnected`
    async fn check_health(&self) -> Connectivity;
    async fn run_code(&self, request: &ExecutionRequest) -> ApiResult<ExecutionResult>;
    async fn submit_code(&self, request: &ExecutionRequest) -> ApiResult<SubmissionReport>;
    async fn ask_chat(&self, request: &ChatRequest) -> ApiResult<ChatReply>;
    async fn fetch_knowledge(&self, name: &str) -> ApiResult<KnowledgeDocument>;
    /// Where requests go, for user-facing guidance
    fn server(&self) -> &str;
}

/// FastAPI error body
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Clone)]
pub struct HttpLabApi {
    client: Client,
    endpoints: Endpoints,
}

impl HttpLabApi {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> ApiResult<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if endpoints.is_loopback() {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;
        Ok(Self { client, endpoints })
    }

    async fn status_error(response: Response) -> ApiError {
        let status = response.status();
        let detail = match response.json::<ErrorBody>().await {
            Ok(body) => match body.detail {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            },
            Err(_) => None,
        };
        ApiError::Status { status, detail }
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> ApiResult<T>
    where
        B: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.post(url).json(body).send().await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl LabApi for HttpLabApi {
    async fn check_health(&self) -> Connectivity {
        let url = self.endpoints.health();
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Connectivity::Connected,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "health check not OK");
                Connectivity::Disconnected
            }
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                Connectivity::Disconnected
            }
        }
    }

    async fn run_code(&self, request: &ExecutionRequest) -> ApiResult<ExecutionResult> {
        tracing::debug!(language = %request.language, bytes = request.code.len(), "running code");
        let result = self.post_json(&self.endpoints.run(), request).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "run request failed");
        }
        result
    }

    async fn submit_code(&self, request: &ExecutionRequest) -> ApiResult<SubmissionReport> {
        tracing::debug!(language = %request.language, "submitting code for grading");
        let result = self.post_json(&self.endpoints.submit(), request).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "submit request failed");
        }
        result
    }

    async fn ask_chat(&self, request: &ChatRequest) -> ApiResult<ChatReply> {
        tracing::debug!(chars = request.message.chars().count(), "asking TA");
        let result: ApiResult<ChatReply> = self.post_json(&self.endpoints.ask(), request).await;
        match &result {
            Ok(reply) => tracing::debug!(sources = reply.sources.len(), "TA replied"),
            Err(e) => tracing::warn!(error = %e, "chat request failed"),
        }
        result
    }

    async fn fetch_knowledge(&self, name: &str) -> ApiResult<KnowledgeDocument> {
        let url = self.endpoints.knowledge(name);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!(error = %e, name, "knowledge fetch failed");
            ApiError::from(e)
        })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), name, "knowledge document unavailable");
            return Err(ApiError::NotFound {
                name: name.to_string(),
            });
        }

        Ok(response.json::<KnowledgeDocument>().await?)
    }

    fn server(&self) -> &str {
        self.endpoints.server()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeApi {
        pub healthy: bool,
        /// How long the first health check takes
        pub first_health_delay: Option<Duration>,
        pub run_result: Option<ExecutionResult>,
        pub submit_report: Option<SubmissionReport>,
        pub chat_reply: Option<ChatReply>,
        pub documents: HashMap<String, KnowledgeDocument>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        pub fn offline() -> Self {
            Self::default()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl LabApi for FakeApi {
        async fn check_health(&self) -> Connectivity {
            self.record("health");
            if let Some(delay) = self.first_health_delay.filter(|_| self.call_count() == 1) {
                tokio::time::sleep(delay).await;
            }
            if self.healthy {
                Connectivity::Connected
            } else {
                Connectivity::Disconnected
            }
        }

        async fn run_code(&self, _request: &ExecutionRequest) -> ApiResult<ExecutionResult> {
            self.record("run");
            self.run_result
                .clone()
                .ok_or_else(|| ApiError::Network("connection refused".to_string()))
        }

        async fn submit_code(&self, _request: &ExecutionRequest) -> ApiResult<SubmissionReport> {
            self.record("submit");
            self.submit_report
                .clone()
                .ok_or_else(|| ApiError::Network("connection refused".to_string()))
        }

        async fn ask_chat(&self, _request: &ChatRequest) -> ApiResult<ChatReply> {
            self.record("ask");
            self.chat_reply
                .clone()
                .ok_or_else(|| ApiError::Network("connection refused".to_string()))
        }

        async fn fetch_knowledge(&self, name: &str) -> ApiResult<KnowledgeDocument> {
            self.record("knowledge");
            self.documents.get(name).cloned().ok_or_else(|| ApiError::NotFound {
                name: name.to_string(),
            })
        }

        fn server(&self) -> &str {
            "http://fake"
        }
    }
}
