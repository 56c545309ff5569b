// Minimal client for the Replicate predictions API.
// A prediction is created with `Prefer: wait`; if it is still running when
// the synchronous wait ends, its `urls.get` endpoint is polled until it
// reaches a terminal status.

use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::output::RemoteJobOutput;
use super::{InitError, UpscaleError};

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL: &str = "nightmareai/real-esrgan";

const ERROR_BODY_LIMIT: usize = 512;

/// `owner/name` or `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl std::str::FromStr for ModelRef {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InitError::InvalidModel(s.to_string());

        let (path, version) = match s.trim().split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (s.trim(), None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;

        let is_segment = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !is_segment(owner) || !is_segment(name) {
            return Err(invalid());
        }
        if let Some(version) = version {
            if !is_segment(version) {
                return Err(invalid());
            }
        }

        Ok(ModelRef {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

/// Stateless after construction; clones share the connection pool.
#[derive(Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: ModelRef,
    poll_interval: Duration,
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ReplicateClient {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        api_token: String,
        model: ModelRef,
        poll_interval: Duration,
    ) -> Result<Self, InitError> {
        if HeaderValue::from_str(&format!("Bearer {}", api_token)).is_err() {
            return Err(InitError::InvalidToken);
        }

        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_token,
            model,
            poll_interval,
        })
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    fn create_request(&self, input: Value) -> (String, Value) {
        match &self.model.version {
            Some(version) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!(
                    "{}/models/{}/{}/predictions",
                    self.api_base, self.model.owner, self.model.name
                ),
                json!({ "input": input }),
            ),
        }
    }

    /// Creates a prediction and drives it to a terminal status.
    pub async fn run(&self, input: Value) -> Result<RemoteJobOutput, UpscaleError> {
        let (endpoint, body) = self.create_request(input);
        info!("Creating prediction for {} at {}", self.model, endpoint);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                UpscaleError::RemoteService(format!("Replicate request failed ({}): {}", endpoint, e))
            })?;
        let mut prediction = read_prediction("Replicate", response).await?;

        loop {
            let id = prediction.id.as_deref().unwrap_or("<unknown>");
            match prediction.status.to_ascii_lowercase().as_str() {
                "succeeded" => {
                    info!("Prediction {} succeeded", id);
                    return Ok(RemoteJobOutput::from(prediction.output));
                }
                "failed" | "canceled" | "aborted" => {
                    return Err(UpscaleError::RemoteService(format!(
                        "Prediction {} {}: {}",
                        id,
                        prediction.status,
                        describe_error(&prediction.error)
                    )));
                }
                "starting" | "processing" => {
                    let poll_url = prediction
                        .urls
                        .as_ref()
                        .and_then(|urls| urls.get.as_deref())
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .ok_or_else(|| {
                            UpscaleError::RemoteService(format!(
                                "Prediction {} is {} but has no poll URL",
                                id, prediction.status
                            ))
                        })?
                        .to_string();

                    debug!("Prediction {} is {}, polling {}", id, prediction.status, poll_url);
                    tokio::time::sleep(self.poll_interval).await;

                    let response = self
                        .http
                        .get(&poll_url)
                        .bearer_auth(&self.api_token)
                        .send()
                        .await
                        .map_err(|e| {
                            UpscaleError::RemoteService(format!(
                                "Replicate poll request failed ({}): {}",
                                poll_url, e
                            ))
                        })?;
                    prediction = read_prediction("Replicate poll", response).await?;
                }
                other => {
                    return Err(UpscaleError::RemoteService(format!(
                        "Prediction {} has unexpected status '{}'",
                        id, other
                    )));
                }
            }
        }
    }

    /// Fetches the finished artifact. The body is returned as-is.
    pub async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, UpscaleError> {
        info!("Downloading result from {}", url);

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| UpscaleError::RemoteService(format!("Download failed ({}): {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpscaleError::Download {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            UpscaleError::RemoteService(format!("Failed reading download body ({}): {}", url, e))
        })?;
        Ok(bytes.to_vec())
    }
}

async fn read_prediction(
    label: &str,
    response: reqwest::Response,
) -> Result<Prediction, UpscaleError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        UpscaleError::RemoteService(format!("{} response body read failed: {}", label, e))
    })?;

    if !status.is_success() {
        // Replicate reports problems as {"detail": "..."}; fall back to the raw body.
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| truncate(&body, ERROR_BODY_LIMIT));
        return Err(UpscaleError::RemoteService(format!(
            "{} request failed ({}): {}",
            label,
            status.as_u16(),
            detail
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        UpscaleError::RemoteService(format!("{} returned an invalid prediction: {}", label, e))
    })
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::Null => "no error detail".to_string(),
        Value::String(message) => message.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, model: &str) -> ReplicateClient {
        ReplicateClient::new(
            reqwest::Client::new(),
            &server.uri(),
            "r8_test".to_string(),
            model.parse().unwrap(),
            Duration::from_millis(10),
        )
        .unwrap()
    }

    #[test]
    fn test_model_ref_parsing() {
        let plain: ModelRef = "nightmareai/real-esrgan".parse().unwrap();
        assert_eq!(plain.owner, "nightmareai");
        assert_eq!(plain.name, "real-esrgan");
        assert_eq!(plain.version, None);

        let pinned: ModelRef = "nightmareai/real-esrgan:f121d640bd28".parse().unwrap();
        assert_eq!(pinned.version.as_deref(), Some("f121d640bd28"));
        assert_eq!(pinned.to_string(), "nightmareai/real-esrgan:f121d640bd28");

        for bad in ["", "real-esrgan", "/real-esrgan", "owner/", "a/b:", "a b/c"] {
            assert!(bad.parse::<ModelRef>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_token_must_be_header_safe() {
        let result = ReplicateClient::new(
            reqwest::Client::new(),
            DEFAULT_API_BASE,
            "bad\ntoken".to_string(),
            DEFAULT_MODEL.parse().unwrap(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(InitError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_sync_prediction_uses_model_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/nightmareai/real-esrgan/predictions"))
            .and(header("authorization", "Bearer r8_test"))
            .and(header("prefer", "wait"))
            .and(body_partial_json(json!({ "input": { "scale": 4 } })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": "https://cdn/out.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server, DEFAULT_MODEL)
            .run(json!({ "image": "data:image/png;base64,AA==", "scale": 4 }))
            .await
            .unwrap();
        assert_eq!(output, RemoteJobOutput::Reference("https://cdn/out.png".into()));
    }

    #[tokio::test]
    async fn test_pinned_version_uses_predictions_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predictions"))
            .and(body_partial_json(json!({ "version": "abc123" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p2",
                "status": "succeeded",
                "output": ["https://cdn/a.png"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server, "nightmareai/real-esrgan:abc123")
            .run(json!({}))
            .await
            .unwrap();
        assert!(matches!(output, RemoteJobOutput::List(ref items) if items.len() == 1));
    }

    #[tokio::test]
    async fn test_running_prediction_is_polled() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/predictions/p3", server.uri());

        Mock::given(method("POST"))
            .and(path("/models/nightmareai/real-esrgan/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p3",
                "status": "starting",
                "output": null,
                "urls": { "get": poll_url }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/predictions/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p3",
                "status": "processing",
                "urls": { "get": poll_url }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/predictions/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p3",
                "status": "succeeded",
                "output": { "url": "https://cdn/polled.png" }
            })))
            .mount(&server)
            .await;

        let output = client(&server, DEFAULT_MODEL).run(json!({})).await.unwrap();
        assert_eq!(
            output,
            RemoteJobOutput::File(crate::upscaler::output::FileOutput {
                url: Some("https://cdn/polled.png".into())
            })
        );
    }

    #[tokio::test]
    async fn test_failed_prediction_reports_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p4",
                "status": "failed",
                "error": "CUDA out of memory"
            })))
            .mount(&server)
            .await;

        let err = client(&server, DEFAULT_MODEL).run(json!({})).await.unwrap_err();
        assert!(matches!(err, UpscaleError::RemoteService(_)));
        assert!(err.to_string().contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_auth_failure_carries_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Invalid token."
            })))
            .mount(&server)
            .await;

        let err = client(&server, DEFAULT_MODEL).run(json!({})).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"), "{message}");
        assert!(message.contains("Invalid token."), "{message}");
    }

    #[tokio::test]
    async fn test_download_non_success_is_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing.png", server.uri());
        let err = client(&server, DEFAULT_MODEL)
            .download(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::Download { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_returns_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not really a png".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/out.png", server.uri());
        let bytes = client(&server, DEFAULT_MODEL)
            .download(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(bytes, b"not really a png");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
