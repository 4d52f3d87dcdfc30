//! memu-client - Client library for the MemU memory API.
//!
//! Submits conversations for memory extraction, polls extraction tasks,
//! retrieves memories by query and lists memory categories. Every call goes
//! through a [`RequestExecutor`] that retries transport failures, rate limits
//! and server errors according to a [`RetryPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use memu_client::{CallContext, ConversationMessage, MemorizeRequest, MemuClient};
//!
//! let client = MemuClient::new("your-api-key")?;
//! let ctx = CallContext::new();
//!
//! let conversation = vec![
//!     ConversationMessage::user("I love playing tennis on weekends"),
//!     ConversationMessage::assistant("Tennis is a great way to stay active."),
//!     ConversationMessage::user("I play at the local club every Saturday."),
//! ];
//! let task = client
//!     .memorize(&ctx, &MemorizeRequest::new("user-123", "agent-1", conversation))
//!     .await?;
//! ```

mod client;
pub mod config;
mod context;
pub mod error;
pub mod executor;
pub mod models;
pub mod retry;
mod sleeper;

pub use client::{MemoryApi, MemuClient, MemuClientBuilder};
pub use config::ClientConfig;
pub use context::CallContext;
pub use error::{CancelReason, ErrorKind, MemuError, MemuResult};
pub use executor::{Payload, RequestExecutor};
pub use models::{
    ConversationMessage, ListCategoriesRequest, MemorizeRequest, MemorizeResult, MemoryCategory,
    MemoryItem, MemoryResource, Query, RetrieveRequest, RetrieveResult, TaskState, TaskStatus,
    Validate,
};
pub use retry::{CustomRetryPolicy, DefaultRetryPolicy, NoRetryPolicy, RetryConfig, RetryPolicy};
pub use sleeper::{Sleeper, TokioSleeper};
pub use tokio_util::sync::CancellationToken;
