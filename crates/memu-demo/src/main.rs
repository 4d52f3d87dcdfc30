//! MemU demo - walks through the four MemU API operations.
//!
//! # Configuration
//!
//! Set these environment variables (or put them in `.env`) before running:
//!
//! - `MEMU_API_KEY` - Required, get one from https://memu.so
//! - `MEMU_BASE_URL` - Optional, defaults to `https://api.memu.so`
//! - `MEMU_DEMO_USER_ID` - Optional, defaults to a fresh `demo-user-<uuid>`
//! - `MEMU_DEMO_AGENT_ID` - Optional, defaults to `demo-agent`
//!
//! Press Ctrl+C to abort any in-flight call.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use memu_client::config::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
use memu_client::{
    CallContext, CancellationToken, ConversationMessage, ListCategoriesRequest, MemorizeRequest,
    MemuClient, MemuError, RetrieveRequest, RetrieveResult,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PREVIEW_LIMIT: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so the walkthrough output stays readable.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let client = MemuClient::from_env().context("failed to create MemU client")?;

    let user_id = std::env::var("MEMU_DEMO_USER_ID")
        .unwrap_or_else(|_| format!("demo-user-{}", uuid::Uuid::new_v4()));
    let agent_id = std::env::var("MEMU_DEMO_AGENT_ID").unwrap_or_else(|_| "demo-agent".to_string());
    info!("Running MemU demo for user {} and agent {}", user_id, agent_id);

    let token = CancellationToken::new();
    let ctx = CallContext::new().with_cancellation(token.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, cancelling");
            token.cancel();
        }
    });

    println!("Step 1: memorizing a conversation");
    memorize_and_wait(&client, &ctx, &user_id, &agent_id).await?;

    println!("\nStep 2: listing categories");
    match client
        .list_categories(
            &ctx,
            &ListCategoriesRequest::new(&user_id).with_agent_id(&agent_id),
        )
        .await
    {
        Ok(categories) => {
            println!("  {} categories found", categories.len());
            for category in categories.iter().take(PREVIEW_LIMIT) {
                println!("  - {}", category.name.as_deref().unwrap_or("(unnamed)"));
                if let Some(description) = non_empty(&category.description) {
                    println!("      {}", truncate(description, 80));
                }
                if let Some(summary) = non_empty(&category.summary) {
                    println!("      {}", truncate(summary, 100));
                }
            }
            if categories.len() > PREVIEW_LIMIT {
                println!("  ... and {} more", categories.len() - PREVIEW_LIMIT);
            }
        }
        Err(e) => report("list categories", &e),
    }

    println!("\nStep 3a: retrieving with a text query");
    let request = RetrieveRequest::new(
        &user_id,
        &agent_id,
        "What are the user's hobbies and interests?",
    );
    match client.retrieve(&ctx, &request).await {
        Ok(result) => print_retrieval(&result),
        Err(e) => report("retrieve", &e),
    }

    println!("\nStep 3b: retrieving with a conversation query");
    let query = vec![
        ConversationMessage::user("I want to be more active this year"),
        ConversationMessage::assistant("That's a great goal! What kind of activities interest you?"),
        ConversationMessage::user("What sports do I usually enjoy?"),
    ];
    let request = RetrieveRequest::new(&user_id, &agent_id, query);
    println!(
        "  Sending query:\n{}",
        serde_json::to_string_pretty(&request).context("failed to encode query")?
    );
    match client.retrieve(&ctx, &request).await {
        Ok(result) => print_retrieval(&result),
        Err(e) => report("retrieve", &e),
    }

    println!("\nDemo completed");
    Ok(())
}

/// Submit the sample conversation and wait for extraction to finish.
async fn memorize_and_wait(
    client: &MemuClient,
    ctx: &CallContext,
    user_id: &str,
    agent_id: &str,
) -> Result<()> {
    let started = Utc::now();
    let at = |offset_secs: i64| {
        (started + ChronoDuration::seconds(offset_secs)).to_rfc3339_opts(SecondsFormat::Secs, true)
    };

    let conversation = vec![
        ConversationMessage::user("I love playing tennis on weekends")
            .with_name("John")
            .with_created_at(at(0)),
        ConversationMessage::assistant("That's great! Tennis is an excellent way to stay active.")
            .with_name("Coach")
            .with_created_at(at(15)),
        ConversationMessage::user("I usually play at the local club every Saturday morning.")
            .with_name("John")
            .with_created_at(at(60)),
    ];
    let request = MemorizeRequest::new(user_id, agent_id, conversation)
        .with_user_name("John Doe")
        .with_agent_name("Tennis Coach AI")
        .with_session_date(at(0));

    let submitted = match client.memorize(ctx, &request).await {
        Ok(submitted) => submitted,
        Err(e @ MemuError::Authentication { .. }) => {
            return Err(e).context("check MEMU_API_KEY");
        }
        Err(e) => {
            report("memorize", &e);
            return Ok(());
        }
    };

    let Some(task_id) = submitted.task_id else {
        println!("  Submitted, but the server returned no task id");
        return Ok(());
    };
    println!(
        "  Task {} submitted ({})",
        task_id,
        submitted.status.as_deref().unwrap_or("unknown status")
    );

    match client
        .wait_for_task(ctx, &task_id, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT)
        .await
    {
        Ok(status) if status.status.is_success() => {
            let elapsed = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
            println!("  Task {} finished as {} in {:.1}s", task_id, status.status, elapsed);
        }
        Ok(status) => println!(
            "  Task {} failed: {}",
            task_id,
            status.detail_info.as_deref().unwrap_or("no details")
        ),
        Err(e) => report("wait for task", &e),
    }
    Ok(())
}

fn print_retrieval(result: &RetrieveResult) {
    if let Some(rewritten) = &result.rewritten_query {
        println!("  Rewritten query: {}", rewritten);
    }

    println!("  {} memory items", result.items.len());
    for (i, item) in result.items.iter().take(PREVIEW_LIMIT).enumerate() {
        println!(
            "  {}. [{}] {}",
            i + 1,
            item.memory_type.as_deref().unwrap_or("unknown"),
            truncate(item.content.as_deref().unwrap_or("(empty)"), 80)
        );
    }

    if !result.categories.is_empty() {
        println!("  {} related categories", result.categories.len());
        for category in result.categories.iter().take(3) {
            println!("  - {}", category.name.as_deref().unwrap_or("(unnamed)"));
        }
    }

    if !result.resources.is_empty() {
        println!("  {} resources", result.resources.len());
        for resource in result.resources.iter().take(3) {
            println!(
                "  - [{}] {}",
                resource.modality.as_deref().unwrap_or("unknown"),
                truncate(resource.resource_url.as_deref().unwrap_or("(no url)"), 50)
            );
        }
    }
}

fn report(operation: &str, e: &MemuError) {
    error!(kind = %e.kind(), "Failed to {}: {}", operation, e);
    if let Some(suggestion) = e.suggestion() {
        println!("  Hint: {}", suggestion);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Shorten `text` to at most `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
