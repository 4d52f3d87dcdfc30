//! Memory client implementation for the MemU API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::error::{CancelReason, MemuError, MemuResult};
use crate::executor::{Payload, RequestExecutor, RAW_KEY};
use crate::models::{
    ListCategoriesRequest, MemorizeRequest, MemorizeResult, MemoryCategory, RetrieveRequest,
    RetrieveResult, TaskStatus, Validate,
};
use crate::retry::{DefaultRetryPolicy, RetryConfig, RetryPolicy};
use crate::sleeper::{Sleeper, TokioSleeper};

const MEMORIZE_PATH: &str = "/api/v3/memory/memorize";
const TASK_STATUS_PATH: &str = "/api/v3/memory/memorize/status";
const RETRIEVE_PATH: &str = "/api/v3/memory/retrieve";
const CATEGORIES_PATH: &str = "/api/v3/memory/categories";

const DEFAULT_USER_NAME: &str = "User";
const DEFAULT_AGENT_NAME: &str = "Assistant";

/// Operations offered by the MemU API.
///
/// Implemented by [`MemuClient`]; depend on the trait to substitute a fake
/// in tests.
#[async_trait]
pub trait MemoryApi: Send + Sync {
    /// Submit a conversation for asynchronous memory extraction.
    async fn memorize(&self, ctx: &CallContext, request: &MemorizeRequest)
        -> MemuResult<MemorizeResult>;

    /// Get the status of a memorization task.
    async fn get_task_status(&self, ctx: &CallContext, task_id: &str) -> MemuResult<TaskStatus>;

    /// Retrieve memories relevant to a query.
    async fn retrieve(&self, ctx: &CallContext, request: &RetrieveRequest)
        -> MemuResult<RetrieveResult>;

    /// List memory categories.
    async fn list_categories(
        &self,
        ctx: &CallContext,
        request: &ListCategoriesRequest,
    ) -> MemuResult<Vec<MemoryCategory>>;
}

/// Client for the MemU API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct MemuClient {
    executor: RequestExecutor,
    sleeper: Arc<dyn Sleeper>,
}

/// Builder for [`MemuClient`].
#[derive(Debug)]
pub struct MemuClientBuilder {
    config: ClientConfig,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    http_client: Option<Client>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl MemuClientBuilder {
    /// Set the retry policy. Defaults to exponential backoff with the
    /// configured retry ceiling.
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Use a preconfigured HTTP client. Its own timeout settings apply.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set how backoff and polling waits are performed.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Build the client.
    pub fn build(self) -> MemuResult<MemuClient> {
        let config = self.config;
        config.validate()?;
        let headers = config.default_headers()?;

        let http = match self.http_client {
            Some(client) => client,
            None => Client::builder().timeout(config.timeout).build().map_err(|e| {
                MemuError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?,
        };

        let policy = self.retry_policy.unwrap_or_else(|| {
            Arc::new(DefaultRetryPolicy::new(
                RetryConfig::default().with_max_retries(config.max_retries),
            ))
        });
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));

        debug!(base_url = %config.base_url, "Created MemU client");

        Ok(MemuClient {
            executor: RequestExecutor::new(
                http,
                config.base_url,
                headers,
                policy,
                sleeper.clone(),
            ),
            sleeper,
        })
    }
}

impl MemuClient {
    /// Create a client with default settings.
    pub fn new(api_key: &str) -> MemuResult<Self> {
        Self::builder(ClientConfig::new(api_key)?).build()
    }

    /// Create a client from environment variables.
    pub fn from_env() -> MemuResult<Self> {
        Self::builder(ClientConfig::from_env()?).build()
    }

    /// Start building a client from a configuration.
    pub fn builder(config: ClientConfig) -> MemuClientBuilder {
        MemuClientBuilder {
            config,
            retry_policy: None,
            http_client: None,
            sleeper: None,
        }
    }

    /// Get the request executor, for endpoints without a typed wrapper.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Memorize a conversation and start memory extraction.
    pub async fn memorize(
        &self,
        ctx: &CallContext,
        request: &MemorizeRequest,
    ) -> MemuResult<MemorizeResult> {
        request.validate()?;

        let payload = memorize_payload(request);
        let response = self
            .executor
            .execute(ctx, Method::POST, MEMORIZE_PATH, Some(&payload), None)
            .await?;

        let result = MemorizeResult {
            task_id: string_field(&response, "task_id"),
            status: string_field(&response, "status"),
            message: string_field(&response, "message"),
        };
        info!(
            "Submitted memorization task {}",
            result.task_id.as_deref().unwrap_or("<none>")
        );
        Ok(result)
    }

    /// Get the status of a memorization task.
    pub async fn get_task_status(&self, ctx: &CallContext, task_id: &str) -> MemuResult<TaskStatus> {
        if task_id.is_empty() {
            return Err(MemuError::invalid_argument("GetTaskStatus: task_id is required"));
        }

        let path = format!("{}/{}", TASK_STATUS_PATH, task_id);
        let response = self
            .executor
            .execute(ctx, Method::GET, &path, None::<&Value>, None)
            .await?;

        serde_json::from_value(Value::Object(response))
            .map_err(|e| MemuError::parse(format!("failed to parse task status: {}", e)))
    }

    /// Retrieve memories relevant to a query.
    pub async fn retrieve(
        &self,
        ctx: &CallContext,
        request: &RetrieveRequest,
    ) -> MemuResult<RetrieveResult> {
        request.validate()?;

        let payload = json!({
            "user_id": request.user_id,
            "agent_id": request.agent_id,
            "query": request.query,
        });
        let mut response = self
            .executor
            .execute(ctx, Method::POST, RETRIEVE_PATH, Some(&payload), None)
            .await?;

        Ok(RetrieveResult {
            rewritten_query: string_field(&response, "rewritten_query"),
            categories: take_list(&mut response, "categories")?,
            items: take_list(&mut response, "items")?,
            resources: take_list(&mut response, "resources")?,
        })
    }

    /// List memory categories for a user, optionally narrowed to one agent.
    pub async fn list_categories(
        &self,
        ctx: &CallContext,
        request: &ListCategoriesRequest,
    ) -> MemuResult<Vec<MemoryCategory>> {
        request.validate()?;

        let mut payload = Payload::new();
        payload.insert("user_id".to_string(), json!(request.user_id));
        if let Some(agent_id) = &request.agent_id {
            payload.insert("agent_id".to_string(), json!(agent_id));
        }

        let mut response = self
            .executor
            .execute(ctx, Method::POST, CATEGORIES_PATH, Some(&payload), None)
            .await?;

        if response.contains_key("categories") {
            return take_list(&mut response, "categories");
        }

        // A bare JSON array arrives as raw text.
        match response.get(RAW_KEY).and_then(Value::as_str) {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => parse_list(items, "categories"),
                _ => Ok(Vec::new()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Poll a task until it reaches a terminal state.
    ///
    /// A `FAILED` task is returned as a status, not an error. Gives up with
    /// [`CancelReason::DeadlineExceeded`] once `timeout` has been spent.
    pub async fn wait_for_task(
        &self,
        ctx: &CallContext,
        task_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> MemuResult<TaskStatus> {
        let started = tokio::time::Instant::now();
        // Counted separately so an early-returning sleeper still bounds the loop.
        let mut waited = Duration::ZERO;
        let mut polls: u32 = 0;

        loop {
            let status = self.get_task_status(ctx, task_id).await?;
            polls += 1;
            if status.status.is_terminal() {
                info!("Task {} finished as {} after {} polls", task_id, status.status, polls);
                return Ok(status);
            }

            debug!("Task {} is {}, polling again in {:?}", task_id, status.status, poll_interval);
            let spent = started.elapsed().max(waited);
            if spent.saturating_add(poll_interval) > timeout {
                return Err(MemuError::Cancelled {
                    reason: CancelReason::DeadlineExceeded,
                    attempts: polls,
                });
            }

            ctx.run(self.sleeper.sleep(poll_interval))
                .await
                .map_err(|reason| MemuError::Cancelled {
                    reason,
                    attempts: polls,
                })?;
            waited = waited.saturating_add(poll_interval);
        }
    }
}

#[async_trait]
impl MemoryApi for MemuClient {
    async fn memorize(
        &self,
        ctx: &CallContext,
        request: &MemorizeRequest,
    ) -> MemuResult<MemorizeResult> {
        MemuClient::memorize(self, ctx, request).await
    }

    async fn get_task_status(&self, ctx: &CallContext, task_id: &str) -> MemuResult<TaskStatus> {
        MemuClient::get_task_status(self, ctx, task_id).await
    }

    async fn retrieve(
        &self,
        ctx: &CallContext,
        request: &RetrieveRequest,
    ) -> MemuResult<RetrieveResult> {
        MemuClient::retrieve(self, ctx, request).await
    }

    async fn list_categories(
        &self,
        ctx: &CallContext,
        request: &ListCategoriesRequest,
    ) -> MemuResult<Vec<MemoryCategory>> {
        MemuClient::list_categories(self, ctx, request).await
    }
}

/// Build the memorize payload, filling in default display names.
fn memorize_payload(request: &MemorizeRequest) -> Payload {
    let mut payload = Payload::new();
    payload.insert("user_id".to_string(), json!(request.user_id));
    payload.insert("agent_id".to_string(), json!(request.agent_id));
    payload.insert(
        "user_name".to_string(),
        json!(non_blank(&request.user_name).unwrap_or(DEFAULT_USER_NAME)),
    );
    payload.insert(
        "agent_name".to_string(),
        json!(non_blank(&request.agent_name).unwrap_or(DEFAULT_AGENT_NAME)),
    );

    if !request.conversation.is_empty() {
        payload.insert("conversation".to_string(), json!(request.conversation));
    } else if let Some(text) = &request.conversation_text {
        payload.insert("conversation_text".to_string(), json!(text));
    }

    if let Some(date) = &request.session_date {
        payload.insert("session_date".to_string(), json!(date));
    }
    payload
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn string_field(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Remove `key` from the payload and parse it as a list; anything but an
/// array yields an empty list.
fn take_list<T: DeserializeOwned>(payload: &mut Payload, key: &str) -> MemuResult<Vec<T>> {
    match payload.remove(key) {
        Some(Value::Array(items)) => parse_list(items, key),
        _ => Ok(Vec::new()),
    }
}

fn parse_list<T: DeserializeOwned>(items: Vec<Value>, key: &str) -> MemuResult<Vec<T>> {
    serde_json::from_value(Value::Array(items))
        .map_err(|e| MemuError::parse(format!("failed to parse {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationMessage;

    fn conversation() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("I love tennis"),
            ConversationMessage::assistant("Great!"),
            ConversationMessage::user("Every Saturday"),
        ]
    }

    #[test]
    fn test_memorize_payload_defaults_names() {
        let payload = memorize_payload(&MemorizeRequest::new("u1", "a1", conversation()));
        assert_eq!(payload["user_name"], json!("User"));
        assert_eq!(payload["agent_name"], json!("Assistant"));
        assert_eq!(payload["conversation"].as_array().map(Vec::len), Some(3));
        assert!(!payload.contains_key("conversation_text"));
        assert!(!payload.contains_key("session_date"));
    }

    #[test]
    fn test_memorize_payload_prefers_conversation() {
        let mut request = MemorizeRequest::new("u1", "a1", conversation())
            .with_user_name("John")
            .with_agent_name("Coach")
            .with_session_date("2024-01-15");
        request.conversation_text = Some("ignored".to_string());

        let payload = memorize_payload(&request);
        assert_eq!(payload["user_name"], json!("John"));
        assert_eq!(payload["agent_name"], json!("Coach"));
        assert_eq!(payload["session_date"], json!("2024-01-15"));
        assert!(!payload.contains_key("conversation_text"));
    }

    #[test]
    fn test_memorize_payload_text() {
        let payload = memorize_payload(&MemorizeRequest::from_text("u1", "a1", "user: hi"));
        assert_eq!(payload["conversation_text"], json!("user: hi"));
        assert!(!payload.contains_key("conversation"));
    }

    #[test]
    fn test_take_list_ignores_non_arrays() {
        let mut payload = json!({"items": {"not": "a list"}})
            .as_object()
            .cloned()
            .unwrap();
        let items: Vec<crate::models::MemoryItem> = take_list(&mut payload, "items").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_take_list_reports_bad_elements() {
        let mut payload = json!({"categories": [{"name": 7}]})
            .as_object()
            .cloned()
            .unwrap();
        let err = take_list::<MemoryCategory>(&mut payload, "categories").unwrap_err();
        assert!(err.to_string().contains("failed to parse categories"));
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let client = MemuClient::new("test_key").unwrap();
        assert_eq!(client.executor().base_url(), "https://api.memu.so");
        assert!(MemuClient::new(" ").is_err());
    }

    #[test]
    fn test_builder_applies_configured_max_retries() {
        let config = ClientConfig::new("test_key").unwrap().with_max_retries(1);
        let client = MemuClient::builder(config).build().unwrap();
        let policy = client.executor().policy();
        assert!(policy.should_retry(0, Some(503), None));
        assert!(!policy.should_retry(1, Some(503), None));
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
    }
}
