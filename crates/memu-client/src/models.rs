//! Request and response types for the MemU API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{MemuError, MemuResult};

/// Minimum number of messages a conversation must carry to be memorized.
pub const MIN_CONVERSATION_MESSAGES: usize = 3;

/// Local parameter validation, run before any request is sent.
pub trait Validate {
    fn validate(&self) -> MemuResult<()>;
}

/// State of an asynchronous memorization task.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Success,
    Failed,
    /// Any state this client does not know about, including a missing one.
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Whether the task will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Success | Self::Failed)
    }

    /// Whether the task finished successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Success)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Sender role: "user", "assistant" or "system".
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ISO 8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ConversationMessage {
    /// Create a message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
            created_at: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Builder: set the sender name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set the creation timestamp.
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

/// Request to memorize a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorizeRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ConversationMessage>,
    /// Raw conversation text, used when `conversation` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_text: Option<String>,
    pub user_id: String,
    pub agent_id: String,
    /// Display name for the user; the API payload defaults it to "User".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Display name for the agent; the API payload defaults it to "Assistant".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// ISO 8601 session date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_date: Option<String>,
}

impl MemorizeRequest {
    /// Create a request for a structured conversation.
    pub fn new(
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
        conversation: Vec<ConversationMessage>,
    ) -> Self {
        Self {
            conversation,
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    /// Create a request for raw conversation text.
    pub fn from_text(
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_text: Some(text.into()),
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    /// Builder: set the user display name.
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Builder: set the agent display name.
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Builder: set the session date.
    pub fn with_session_date(mut self, date: impl Into<String>) -> Self {
        self.session_date = Some(date.into());
        self
    }
}

impl Validate for MemorizeRequest {
    fn validate(&self) -> MemuResult<()> {
        if self.user_id.is_empty() {
            return Err(MemuError::invalid_argument("Memorize: user_id is required"));
        }
        if self.agent_id.is_empty() {
            return Err(MemuError::invalid_argument("Memorize: agent_id is required"));
        }
        if self.conversation.is_empty() && self.conversation_text.is_none() {
            return Err(MemuError::invalid_argument(
                "Memorize: either conversation or conversation_text must be provided",
            ));
        }
        if !self.conversation.is_empty() && self.conversation.len() < MIN_CONVERSATION_MESSAGES {
            return Err(MemuError::invalid_argument(format!(
                "Memorize: conversation must contain at least {} messages",
                MIN_CONVERSATION_MESSAGES
            )));
        }
        Ok(())
    }
}

/// Result of submitting a memorization task.
///
/// Extracted memories are not returned here; poll the task and use
/// retrieval once it finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorizeResult {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Status of a memorization task.
///
/// Fields the server leaves out decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub status: TaskState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail_info: Option<String>,
}

/// Retrieval query: free text or a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Text(String),
    Conversation(Vec<ConversationMessage>),
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ConversationMessage>> for Query {
    fn from(messages: Vec<ConversationMessage>) -> Self {
        Self::Conversation(messages)
    }
}

/// Request to retrieve memories relevant to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: Query,
    pub user_id: String,
    pub agent_id: String,
}

impl RetrieveRequest {
    /// Create a retrieval request.
    pub fn new(
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
        query: impl Into<Query>,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

impl Validate for RetrieveRequest {
    fn validate(&self) -> MemuResult<()> {
        match &self.query {
            Query::Text(text) if text.trim().is_empty() => {
                return Err(MemuError::invalid_argument("Retrieve: query is required"));
            }
            Query::Conversation(messages) if messages.is_empty() => {
                return Err(MemuError::invalid_argument("Retrieve: query is required"));
            }
            _ => {}
        }
        if self.user_id.is_empty() {
            return Err(MemuError::invalid_argument("Retrieve: user_id is required"));
        }
        if self.agent_id.is_empty() {
            return Err(MemuError::invalid_argument("Retrieve: agent_id is required"));
        }
        Ok(())
    }
}

/// Request to list memory categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListCategoriesRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl ListCategoriesRequest {
    /// Create a request scoped to a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_id: None,
        }
    }

    /// Builder: narrow to one agent.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

impl Validate for ListCategoriesRequest {
    fn validate(&self) -> MemuResult<()> {
        if self.user_id.is_empty() {
            return Err(MemuError::invalid_argument(
                "ListCategories: user_id is required",
            ));
        }
        Ok(())
    }
}

/// Aggregated memory category, e.g. `preferences` or `work_life`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCategory {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Summary of every memory in the category.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Discrete memory unit such as a preference, skill or habit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub memory_type: Option<String>,
}

/// Source material memory items were extracted from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryResource {
    /// "text", "image", "audio", ...
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub resource_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub content: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Memories retrieved for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResult {
    /// Query as rewritten by the service for retrieval.
    #[serde(default)]
    pub rewritten_query: Option<String>,
    #[serde(default)]
    pub categories: Vec<MemoryCategory>,
    #[serde(default)]
    pub items: Vec<MemoryItem>,
    #[serde(default)]
    pub resources: Vec<MemoryResource>,
}

impl RetrieveResult {
    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.items.is_empty() && self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn three_messages() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("I love tennis"),
            ConversationMessage::assistant("Great sport!"),
            ConversationMessage::user("I play every Saturday"),
        ]
    }

    #[test]
    fn test_task_state_wire_format() {
        let state: TaskState = serde_json::from_value(json!("PROCESSING")).unwrap();
        assert_eq!(state, TaskState::Processing);
        assert_eq!(serde_json::to_value(TaskState::Success).unwrap(), json!("SUCCESS"));
        assert_eq!(TaskState::Failed.to_string(), "FAILED");
        assert_eq!(TaskState::from_str("COMPLETED").unwrap(), TaskState::Completed);
    }

    #[test]
    fn test_task_state_unknown() {
        let state: TaskState = serde_json::from_value(json!("QUEUED")).unwrap();
        assert_eq!(state, TaskState::Unknown);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Processing.is_terminal());
        assert!(TaskState::Completed.is_success());
        assert!(TaskState::Success.is_success());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Failed.is_success());
    }

    #[test]
    fn test_task_status_missing_fields_default() {
        let status: TaskStatus =
            serde_json::from_value(json!({"status": "SUCCESS", "message": null})).unwrap();
        assert_eq!(status.task_id, "");
        assert_eq!(status.status, TaskState::Success);
        assert!(status.message.is_none());

        let status: TaskStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(status.status, TaskState::Unknown);
        assert!(!status.status.is_terminal());
    }

    #[test]
    fn test_task_status_wrong_type_rejected() {
        assert!(serde_json::from_value::<TaskStatus>(json!({"task_id": "t1", "status": 5})).is_err());
    }

    #[test]
    fn test_message_skips_empty_optionals() {
        let value = serde_json::to_value(ConversationMessage::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let value = serde_json::to_value(
            ConversationMessage::user("hi")
                .with_name("John")
                .with_created_at("2024-01-15T10:30:00Z"),
        )
        .unwrap();
        assert_eq!(value["name"], json!("John"));
        assert_eq!(value["created_at"], json!("2024-01-15T10:30:00Z"));
    }

    #[test]
    fn test_memorize_validation() {
        assert!(MemorizeRequest::new("u1", "a1", three_messages()).validate().is_ok());
        assert!(MemorizeRequest::from_text("u1", "a1", "user: hi").validate().is_ok());

        let err = MemorizeRequest::new("", "a1", three_messages()).validate().unwrap_err();
        assert!(err.to_string().contains("user_id is required"));

        let err = MemorizeRequest::new("u1", "", three_messages()).validate().unwrap_err();
        assert!(err.to_string().contains("agent_id is required"));

        let err = MemorizeRequest::new("u1", "a1", Vec::new()).validate().unwrap_err();
        assert!(err.to_string().contains("either conversation or conversation_text"));

        let err = MemorizeRequest::new("u1", "a1", three_messages()[..2].to_vec())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("at least 3 messages"));
    }

    #[test]
    fn test_retrieve_validation() {
        assert!(RetrieveRequest::new("u1", "a1", "tennis").validate().is_ok());
        assert!(RetrieveRequest::new("u1", "a1", three_messages()).validate().is_ok());

        assert!(RetrieveRequest::new("u1", "a1", "  ").validate().is_err());
        assert!(RetrieveRequest::new("u1", "a1", Vec::<ConversationMessage>::new()).validate().is_err());
        assert!(RetrieveRequest::new("", "a1", "q").validate().is_err());
        assert!(RetrieveRequest::new("u1", "", "q").validate().is_err());
    }

    #[test]
    fn test_query_serializes_untagged() {
        let text = serde_json::to_value(Query::from("hobbies")).unwrap();
        assert_eq!(text, json!("hobbies"));

        let conversation =
            serde_json::to_value(Query::from(vec![ConversationMessage::user("hi")])).unwrap();
        assert_eq!(conversation, json!([{"role": "user", "content": "hi"}]));
    }

    #[test]
    fn test_list_categories_validation() {
        assert!(ListCategoriesRequest::new("u1").validate().is_ok());
        assert!(ListCategoriesRequest::new("u1")
            .with_agent_id("a1")
            .validate()
            .is_ok());
        assert!(ListCategoriesRequest::new("").validate().is_err());
    }

    #[test]
    fn test_retrieve_result_tolerates_missing_lists() {
        let result: RetrieveResult =
            serde_json::from_value(json!({"rewritten_query": "tennis schedule"})).unwrap();
        assert_eq!(result.rewritten_query.as_deref(), Some("tennis schedule"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_memory_resource_with_metadata() {
        let resource: MemoryResource = serde_json::from_value(json!({
            "modality": "conversation",
            "metadata": {"source": "chat", "turns": 3}
        }))
        .unwrap();
        assert_eq!(resource.modality.as_deref(), Some("conversation"));
        assert_eq!(resource.metadata.unwrap()["turns"], json!(3));
        assert!(resource.content.is_none());
    }
}
