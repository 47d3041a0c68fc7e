use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::error;
use crate::modules::generation::client::GenerationClient;
use crate::modules::generation::model::PredictionInput;
use crate::utils::truncate_chars;

const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for Replicate's predictions API. Requests are sent with
/// `Prefer: wait` so most predictions come back resolved; anything still
/// queued is polled until it settles or the poll deadline passes.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    api_base: String,
    api_token: String,
    http: reqwest::Client,
}

impl ReplicateClient {
    /// `REPLICATE_API_BASE` overrides the endpoint for self-hosted
    /// gateways and local mock servers.
    pub fn new(api_token: impl Into<String>) -> Result<Self, error::SystemError> {
        let api_base = std::env::var("REPLICATE_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            api_base,
            api_token: api_token.into(),
            http,
        })
    }

    /// Wait for a pending prediction to leave the queue.
    async fn poll_prediction(&self, poll_url: &str) -> Result<Value, error::SystemError> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            let payload = json_or_upstream_error("poll", response).await?;

            match prediction_status(&payload).as_str() {
                "succeeded" => return Ok(payload),
                "failed" | "canceled" => {
                    return Err(error::SystemError::upstream(format!(
                        "prediction {}: {}",
                        prediction_status(&payload),
                        truncate_chars(&payload.to_string(), 512),
                    )));
                }
                _ => {}
            }

            if started.elapsed() >= POLL_TIMEOUT {
                return Err(error::SystemError::upstream(format!(
                    "prediction polling timed out after {}s",
                    POLL_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl GenerationClient for ReplicateClient {
    async fn run(
        &self,
        model: &str,
        input: &PredictionInput,
    ) -> Result<Vec<String>, error::SystemError> {
        let endpoint = format!("{}/predictions", self.api_base);
        let body = serde_json::json!({ "model": model, "input": input });

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction = json_or_upstream_error("prediction", response).await?;

        let status = prediction_status(&prediction);
        if status != "succeeded" {
            if matches!(status.as_str(), "starting" | "processing") {
                let poll_url = prediction
                    .get("urls")
                    .and_then(Value::as_object)
                    .and_then(|urls| urls.get("get"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| {
                        error::SystemError::upstream("prediction is missing its poll URL")
                    })?
                    .to_string();
                prediction = self.poll_prediction(&poll_url).await?;
            } else {
                return Err(error::SystemError::upstream(format!(
                    "prediction failed: {}",
                    truncate_chars(&prediction.to_string(), 512),
                )));
            }
        }

        let mut urls = Vec::new();
        if let Some(output) = prediction.get("output") {
            extract_output_urls(output, &mut urls);
        }
        if urls.is_empty() {
            return Err(error::SystemError::upstream(
                "prediction returned no output images",
            ));
        }
        Ok(urls)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, error::SystemError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(error::SystemError::upstream(format!(
                "image download returned HTTP {}: {}",
                status,
                truncate_chars(&body, 512),
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn prediction_status(payload: &Value) -> String {
    payload
        .get("status")
        .and_then(Value::as_str)
        .map(|status| status.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Collect every http(s) URL reachable through a prediction's `output`
/// value. Models return a bare string, an array of strings, or objects
/// keyed `url`/`urls`/`output` depending on how they are packaged.
fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|seen| seen == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(fields) => {
            for key in ["url", "urls", "output"] {
                if let Some(inner) = fields.get(key) {
                    extract_output_urls(inner, out);
                }
            }
        }
        _ => {}
    }
}

async fn json_or_upstream_error(
    what: &str,
    response: reqwest::Response,
) -> Result<Value, error::SystemError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(error::SystemError::upstream(format!(
            "{} request returned HTTP {}: {}",
            what,
            status,
            truncate_chars(&body, 512),
        )));
    }
    Ok(response.json::<Value>().await?)
}
