//! Resume parsing via the VLM Run document API.
//!
//! Upload returns a prediction id; the prediction is then polled until it
//! reports `completed` or `failed`. Polling is bounded: 5s interval, 120s
//! budget, after which the parse is treated as failed.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const PARSE_DOMAIN: &str = "document.resume";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_BUDGET: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parsing failed: {0}")]
    Failed(String),

    #[error("Prediction {id} timed out after {budget_secs}s")]
    Timeout { id: String, budget_secs: u64 },
}

/// Seam for the external parsing service, so handlers and tests can swap
/// the real client for a stub.
#[async_trait]
pub trait ResumeParser: Send + Sync {
    /// Parses a resume document, returning its structured fields.
    async fn parse(&self, contents: Bytes, filename: &str) -> Result<Value, ParserError>;
}

/// Where prediction states come from. `VlmParser` reads them over HTTP;
/// tests feed them in directly.
#[async_trait]
trait PredictionSource: Sync {
    async fn fetch(&self, id: &str) -> Result<Prediction, ParserError>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

/// Client for the VLM Run document API.
#[derive(Clone)]
pub struct VlmParser {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VlmParser {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            api_key,
        }
    }

    /// Submits the document for parsing, returning the prediction id.
    async fn submit(&self, contents: Bytes, filename: &str) -> Result<String, ParserError> {
        let part = Part::bytes(contents.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new()
            .part("file", part)
            .text("domain", PARSE_DOMAIN);

        let response = self
            .client
            .post(format!("{}/document/generate", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ParserError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let prediction: Prediction = response.json().await?;
        debug!(
            "Submitted document for parsing: prediction {} ({})",
            prediction.id, prediction.status
        );
        Ok(prediction.id)
    }
}

#[async_trait]
impl PredictionSource for VlmParser {
    /// Fetches the current state of a prediction.
    async fn fetch(&self, id: &str) -> Result<Prediction, ParserError> {
        let response = self
            .client
            .get(format!("{}/document/{}", self.base_url, id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ParserError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Polls the prediction until completion, failure, or budget exhaustion.
async fn poll(source: &impl PredictionSource, id: &str) -> Result<Value, ParserError> {
    let deadline = tokio::time::Instant::now() + POLL_BUDGET;

    loop {
        let prediction = source.fetch(id).await?;
        match prediction.status.as_str() {
            "completed" => {
                return prediction
                    .response
                    .ok_or_else(|| ParserError::Failed("Completed with no response".into()))
            }
            "failed" => {
                let detail = prediction
                    .errors
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(ParserError::Failed(detail));
            }
            other => debug!("Prediction {id} still {other}"),
        }

        if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
            warn!("Prediction {id} did not finish within the polling budget");
            return Err(ParserError::Timeout {
                id: id.to_string(),
                budget_secs: POLL_BUDGET.as_secs(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[async_trait]
impl ResumeParser for VlmParser {
    async fn parse(&self, contents: Bytes, filename: &str) -> Result<Value, ParserError> {
        let id = self.submit(contents, filename).await?;
        poll(self, &id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_prediction_pending_has_no_response() {
        let p: Prediction =
            serde_json::from_str(r#"{"id": "pred_1", "status": "running"}"#).unwrap();
        assert_eq!(p.id, "pred_1");
        assert_eq!(p.status, "running");
        assert!(p.response.is_none());
        assert!(p.errors.is_none());
    }

    #[test]
    fn test_prediction_completed_carries_parsed_fields() {
        let p: Prediction = serde_json::from_str(
            r#"{"id": "pred_2", "status": "completed", "response": {"summary": "dev"}}"#,
        )
        .unwrap();
        assert_eq!(p.status, "completed");
        assert_eq!(p.response.unwrap()["summary"], "dev");
    }

    struct ScriptedSource {
        calls: AtomicU32,
        statuses: Vec<&'static str>,
    }

    impl ScriptedSource {
        fn new(statuses: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                statuses,
            }
        }
    }

    #[async_trait]
    impl PredictionSource for ScriptedSource {
        async fn fetch(&self, id: &str) -> Result<Prediction, ParserError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let status = self
                .statuses
                .get(n)
                .or_else(|| self.statuses.last())
                .copied()
                .unwrap_or("running");
            Ok(Prediction {
                id: id.to_string(),
                status: status.to_string(),
                response: (status == "completed").then(|| serde_json::json!({"summary": "dev"})),
                errors: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_gives_up_after_budget() {
        let source = ScriptedSource::new(vec!["running"]);
        let result = poll(&source, "pred_stuck").await;

        match result {
            Err(ParserError::Timeout { id, budget_secs }) => {
                assert_eq!(id, "pred_stuck");
                assert_eq!(budget_secs, POLL_BUDGET.as_secs());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        // One fetch up front, then one per interval until the budget runs out.
        let expected = 1 + (POLL_BUDGET.as_secs() / POLL_INTERVAL.as_secs()) as u32;
        assert_eq!(source.calls.load(Ordering::SeqCst), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_response_once_completed() {
        let source = ScriptedSource::new(vec!["running", "running", "completed"]);
        let parsed = poll(&source, "pred_ok").await.unwrap();
        assert_eq!(parsed["summary"], "dev");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_surfaces_failed_predictions() {
        let source = ScriptedSource::new(vec!["running", "failed"]);
        let err = poll(&source, "pred_bad").await.unwrap_err();
        assert!(matches!(err, ParserError::Failed(_)));
    }
}
