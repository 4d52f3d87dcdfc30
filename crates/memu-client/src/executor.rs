//! Request execution with retries.
//!
//! [`RequestExecutor::execute`] turns one logical call into as many HTTP
//! attempts as the retry policy allows. Transport failures, 429 and 5xx
//! responses are absorbed here; only the terminal outcome reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::{MemuError, MemuResult};
use crate::retry::RetryPolicy;
use crate::sleeper::Sleeper;

/// Decoded response body: a JSON object, or `{"raw": <text>}` when the body
/// is not one.
pub type Payload = serde_json::Map<String, Value>;

/// Key holding the undecodable response text.
pub const RAW_KEY: &str = "raw";

/// Decode a response body, falling back to its raw text.
///
/// An empty body decodes to an empty mapping.
pub fn decode_payload(bytes: &[u8]) -> Payload {
    if bytes.is_empty() {
        return Payload::new();
    }
    match serde_json::from_slice::<Payload>(bytes) {
        Ok(map) => map,
        Err(_) => {
            let mut map = Payload::new();
            map.insert(
                RAW_KEY.to_string(),
                Value::String(String::from_utf8_lossy(bytes).into_owned()),
            );
            map
        }
    }
}

/// Parse a `Retry-After` header given in whole or fractional seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

fn non_empty(payload: Payload) -> Option<Payload> {
    (!payload.is_empty()).then_some(payload)
}

/// Issues requests against the MemU API and applies the retry policy.
///
/// Immutable after construction; share it freely across tasks.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http: Client,
    base_url: String,
    headers: HeaderMap,
    policy: Arc<dyn RetryPolicy>,
    sleeper: Arc<dyn Sleeper>,
}

/// What a single attempt produced once a response arrived.
struct Received {
    status: StatusCode,
    retry_after: Option<Duration>,
    body: Vec<u8>,
}

impl RequestExecutor {
    pub(crate) fn new(
        http: Client,
        base_url: String,
        headers: HeaderMap,
        policy: Arc<dyn RetryPolicy>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            http,
            base_url,
            headers,
            policy,
            sleeper,
        }
    }

    /// Get the base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.policy
    }

    /// Execute one logical call.
    ///
    /// `path` is appended to the base URL. The body, when present, is sent as
    /// JSON; a body that cannot be serialized fails immediately.
    pub async fn execute<B>(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<&[(&str, &str)]>,
    ) -> MemuResult<Payload>
    where
        B: Serialize + ?Sized,
    {
        let encoded = body.map(serde_json::to_vec).transpose()?;
        let url = format!("{}{}", self.base_url, path);

        let mut attempt: u32 = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .headers(self.headers.clone());
            if let Some(query) = query.filter(|q| !q.is_empty()) {
                request = request.query(query);
            }
            if let Some(bytes) = &encoded {
                request = request.body(bytes.clone());
            }

            debug!(%method, path, attempt, "Sending MemU request");

            let sent = ctx
                .run(async {
                    let response = request.send().await?;
                    let status = response.status();
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.bytes().await?.to_vec();
                    Ok::<_, reqwest::Error>(Received {
                        status,
                        retry_after,
                        body,
                    })
                })
                .await
                .map_err(|reason| MemuError::Cancelled {
                    reason,
                    attempts: attempt + 1,
                })?;

            let received = match sent {
                Ok(received) => received,
                Err(err) => {
                    if self.policy.should_retry(attempt, None, Some(&err)) {
                        let wait = self.policy.backoff(attempt);
                        warn!(
                            "MemU request to {} failed, retrying in {:?}: {}",
                            path, wait, err
                        );
                        self.pause(ctx, wait, attempt).await?;
                        attempt += 1;
                        continue;
                    }
                    return Err(MemuError::Transport {
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            };

            let code = received.status.as_u16();
            let payload = decode_payload(&received.body);

            if received.status == StatusCode::TOO_MANY_REQUESTS {
                let wait = received
                    .retry_after
                    .unwrap_or_else(|| self.policy.backoff(attempt));
                if self.policy.should_retry(attempt, Some(code), None) {
                    warn!("MemU rate limit hit on {}, retrying in {:?}", path, wait);
                    self.pause(ctx, wait, attempt).await?;
                    attempt += 1;
                    continue;
                }
                return Err(MemuError::RateLimit {
                    message: "rate limit exceeded".to_string(),
                    status: code,
                    retry_after: wait,
                    body: non_empty(payload),
                });
            }

            if code >= 500 {
                if self.policy.should_retry(attempt, Some(code), None) {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        "MemU server error {} on {}, retrying in {:?}",
                        code, path, wait
                    );
                    self.pause(ctx, wait, attempt).await?;
                    attempt += 1;
                    continue;
                }
                let message = if received.body.is_empty() {
                    format!("server error: {}", code)
                } else {
                    format!(
                        "server error: {}, response: {}",
                        code,
                        String::from_utf8_lossy(&received.body)
                    )
                };
                return Err(MemuError::Server {
                    message,
                    status: code,
                    body: non_empty(payload),
                });
            }

            if code >= 400 {
                debug!(path, status = code, "MemU request rejected");
                return Err(MemuError::from_status(code, path, non_empty(payload)));
            }

            debug!(path, status = code, attempts = attempt + 1, "MemU request succeeded");
            return Ok(payload);
        }
    }

    /// Wait before the attempt after `attempt`, unless the call is cancelled.
    async fn pause(&self, ctx: &CallContext, wait: Duration, attempt: u32) -> MemuResult<()> {
        ctx.run(self.sleeper.sleep(wait))
            .await
            .map_err(|reason| MemuError::Cancelled {
                reason,
                attempts: attempt + 1,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_decode_json_object() {
        let payload = decode_payload(br#"{"task_id":"t1","status":"PENDING"}"#);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["task_id"], json!("t1"));
        assert_eq!(payload["status"], json!("PENDING"));
    }

    #[test]
    fn test_decode_plain_text_falls_back_to_raw() {
        let payload = decode_payload(b"plain text");
        assert_eq!(Value::Object(payload), json!({"raw": "plain text"}));
    }

    #[test]
    fn test_decode_array_falls_back_to_raw() {
        let payload = decode_payload(b"[1,2]");
        assert_eq!(payload[RAW_KEY], json!("[1,2]"));
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(decode_payload(b"").is_empty());
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(1500)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-3"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
