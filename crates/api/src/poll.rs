//! Polling for ARM long-running operations.
//!
//! ARM answers mutating calls with `201`/`202` and points at a status
//! resource through the `Azure-AsyncOperation` or `Location` header. The
//! helpers here poll that resource at a fixed interval with an attempt cap,
//! so the build steps above never see a half-finished operation.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Client, Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ensure_success;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Interval and attempt cap used while waiting on a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between two status checks.
    #[serde(with = "duration_secs", rename = "interval_secs")]
    pub interval: Duration,
    /// Number of status checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 360,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Status resource URL announced by a long-running operation response, if any.
pub fn operation_url(response: &Response) -> Option<String> {
    let headers = response.headers();
    headers
        .get(ASYNC_OPERATION_HEADER)
        .or_else(|| headers.get(header::LOCATION))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Calls `check` until it yields a value, sleeping `settings.interval` between
/// attempts. Errors from `check` end the wait immediately.
pub async fn wait_until<F, Fut, T>(settings: &PollSettings, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let attempts = settings.max_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(value) = check().await? {
            debug!(what, attempt, "operation reached terminal state");
            return Ok(value);
        }
        debug!(what, attempt, "operation still running");
        if attempt < attempts {
            tokio::time::sleep(settings.interval).await;
        }
    }
    Err(anyhow!("{what} did not finish after {attempts} attempts"))
}

/// Polls an operation status URL until it succeeds and returns its final body.
pub async fn wait_for_async_operation(http: &Client, settings: &PollSettings, url: &str, operation: &str) -> Result<Value> {
    wait_until(settings, operation, move || async move {
        let response = http
            .get(url)
            .send()
            .await
            .map_err(|error| anyhow!("network error while polling {operation}: {error}"))?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(None);
        }
        let response = ensure_success(response, operation).await?;
        let text = response.text().await.context("read operation status")?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).context("decode operation status")?
        };
        operation_outcome(operation, body)
    })
    .await
}

/// Interprets an operation status body: `Ok(None)` while running.
fn operation_outcome(operation: &str, body: Value) -> Result<Option<Value>> {
    let Some(status) = body.get("status").and_then(Value::as_str) else {
        return Ok(Some(body));
    };
    match status {
        "Succeeded" => Ok(Some(body)),
        "Failed" | "Canceled" => {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error details returned");
            bail!("{operation} finished as {status}: {message}")
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{CannedResponse, TestServer};
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn operation_outcome_tracks_status_field() {
        assert_eq!(operation_outcome("capture", json!({ "status": "InProgress" })).unwrap(), None);

        let done = json!({ "status": "Succeeded", "properties": { "output": {} } });
        assert_eq!(operation_outcome("capture", done.clone()).unwrap(), Some(done));

        let failed = json!({ "status": "Failed", "error": { "message": "disk busy" } });
        let error = operation_outcome("capture", failed).unwrap_err();
        assert_eq!(error.to_string(), "capture finished as Failed: disk busy");
    }

    #[test]
    fn bodies_without_status_are_final() {
        assert_eq!(operation_outcome("delete", Value::Null).unwrap(), Some(Value::Null));
    }

    #[test]
    fn poll_settings_deserialize_from_seconds() {
        let settings: PollSettings = serde_json::from_value(json!({ "interval_secs": 2 })).expect("settings");
        assert_eq!(settings.interval, Duration::from_secs(2));
        assert_eq!(settings.max_attempts, 360);
    }

    #[tokio::test]
    async fn wait_until_gives_up_after_max_attempts() {
        let settings = PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        };
        let calls = Cell::new(0);
        let error = wait_until(&settings, "deployment", || {
            calls.set(calls.get() + 1);
            async { Ok::<Option<()>, anyhow::Error>(None) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        assert_eq!(error.to_string(), "deployment did not finish after 3 attempts");
    }

    #[tokio::test]
    async fn wait_until_returns_first_ready_value() {
        let settings = PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        };
        let calls = Cell::new(0);
        let value = wait_until(&settings, "deployment", || {
            calls.set(calls.get() + 1);
            let ready = calls.get() == 2;
            async move { Ok::<_, anyhow::Error>(ready.then_some("done")) }
        })
        .await
        .expect("ready value");

        assert_eq!(value, "done");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn wait_until_does_not_sleep_after_the_last_attempt() {
        let settings = PollSettings {
            interval: Duration::from_secs(3600),
            max_attempts: 0,
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            wait_until(&settings, "deletion", || async { Ok::<Option<()>, anyhow::Error>(None) }),
        )
        .await
        .expect("gave up without sleeping");

        assert_eq!(outcome.unwrap_err().to_string(), "deletion did not finish after 1 attempts");
    }

    #[tokio::test]
    async fn async_operation_polls_through_accepted_until_terminal() {
        let server = TestServer::start(|_| {
            vec![
                CannedResponse::status(202),
                CannedResponse::json(200, json!({ "status": "InProgress" })),
                CannedResponse::json(200, json!({ "status": "Succeeded", "properties": { "output": { "id": "op-1" } } })),
            ]
        })
        .await;
        let settings = PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        };
        let url = format!("{}/operations/op-1", server.base_url);

        let body = wait_for_async_operation(&Client::new(), &settings, &url, "capture").await.expect("operation body");

        assert_eq!(body.pointer("/properties/output/id"), Some(&json!("op-1")));
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn async_operation_failure_ends_the_wait() {
        let server = TestServer::start(|_| {
            vec![CannedResponse::json(200, json!({ "status": "Canceled", "error": { "message": "operation preempted" } }))]
        })
        .await;
        let settings = PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        };
        let url = format!("{}/operations/op-2", server.base_url);

        let error = wait_for_async_operation(&Client::new(), &settings, &url, "generalize").await.unwrap_err();

        assert_eq!(error.to_string(), "generalize finished as Canceled: operation preempted");
        assert_eq!(server.requests().len(), 1);
    }
}
