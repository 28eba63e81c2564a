// src/services/generator.rs

//! Article generation API client.
//!
//! Wraps the three calls of a generation job: initiate, progress, and
//! view. Every call authenticates with the API key as a query parameter.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{
    CompletedGeneration, GeneratedArticle, GenerationHandle, GenerationRequest, GeneratorConfig,
    ProgressStatus,
};
use crate::services::monitor::ProgressSource;
use crate::utils::http::{endpoint, read_text, snippet};
use crate::utils::scalar_to_string;

const SERVICE: &str = "generator";

/// Client for the article generation API.
///
/// Only the most recently initiated (or resumed) job is current; handles
/// from earlier jobs are rejected with [`AppError::StaleHandle`].
pub struct ArticleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    current_epoch: AtomicU64,
}

impl ArticleGenerator {
    pub fn new(client: Client, config: &GeneratorConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            current_epoch: AtomicU64::new(0),
        }
    }

    /// Submit a generation job.
    pub async fn initiate(&self, request: &GenerationRequest) -> Result<GenerationHandle> {
        let mut url = endpoint(&self.base_url, &["api", "initiate_article"])?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .extend_pairs(request.query_pairs());

        log::info!(
            "Initiating article for keyword '{}' ({})",
            request.keyword(),
            request.length()
        );
        let response = self.client.post(url).send().await?;
        let body = read_text(SERVICE, response).await?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::upstream(SERVICE, format!("unreadable initiate response: {e}")))?;

        let Some(ref_key) = payload.get("ref_key").and_then(scalar_to_string) else {
            let reason = payload
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("response has no ref_key");
            return Err(AppError::upstream(SERVICE, reason));
        };

        let handle = self.adopt(ref_key);
        log::info!("Generation started with ref key {}", handle);
        Ok(handle)
    }

    /// Take over an already running job by its ref key.
    pub fn resume(&self, ref_key: impl Into<String>) -> GenerationHandle {
        self.adopt(ref_key.into())
    }

    fn adopt(&self, ref_key: String) -> GenerationHandle {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if epoch > 1 {
            log::debug!("Ref key {} supersedes earlier generation handles", ref_key);
        }
        GenerationHandle::new(ref_key, epoch)
    }

    /// Whether `handle` belongs to the latest initiate or resume call.
    pub fn is_current(&self, handle: &GenerationHandle) -> bool {
        handle.epoch() == self.current_epoch.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, handle: &GenerationHandle) -> Result<()> {
        if self.is_current(handle) {
            Ok(())
        } else {
            Err(AppError::StaleHandle(handle.ref_key().to_string()))
        }
    }

    /// Ask once for the job's progress.
    pub async fn poll_progress(&self, handle: &GenerationHandle) -> Result<ProgressStatus> {
        self.ensure_current(handle)?;

        let mut url = endpoint(&self.base_url, &["api", "get_api_progress"])?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("ref_key", handle.ref_key());

        let response = self.client.post(url).send().await?;
        let body = read_text(SERVICE, response).await?;
        if body.trim().is_empty() {
            return Err(AppError::upstream(SERVICE, "empty progress response"));
        }
        let payload: Value = serde_json::from_str(&body)?;
        let status = parse_progress(&payload)?;

        // a newer job may have started while this request was in flight
        self.ensure_current(handle)?;
        Ok(status)
    }

    /// Download the finished article.
    pub async fn fetch_article(&self, completed: &CompletedGeneration) -> Result<GeneratedArticle> {
        let handle = completed.handle();
        self.ensure_current(handle)?;

        let mut url = endpoint(&self.base_url, &["api", "view_article"])?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("article_id", handle.ref_key());

        let response = self.client.post(url).send().await?;
        let body = read_text(SERVICE, response).await?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::upstream(SERVICE, format!("unreadable article response: {e}")))?;

        let Some(data) = payload.get("data").and_then(Value::as_str) else {
            let reason = payload
                .get("error_message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("article response has no data: {}", snippet(&body)));
            return Err(AppError::upstream(SERVICE, reason));
        };
        if data.trim().is_empty() {
            log::warn!("Article {} came back empty", handle);
        }

        Ok(GeneratedArticle {
            ref_key: handle.ref_key().to_string(),
            body_html: data.to_string(),
        })
    }
}

#[async_trait]
impl ProgressSource for ArticleGenerator {
    async fn poll_progress(&self, handle: &GenerationHandle) -> Result<ProgressStatus> {
        ArticleGenerator::poll_progress(self, handle).await
    }

    fn is_current(&self, handle: &GenerationHandle) -> bool {
        ArticleGenerator::is_current(self, handle)
    }
}

/// Map one progress payload to a job state.
///
/// `api_status` 201 wins over everything, then an explicit `"Fail"`
/// status, then `api_status` 200 with its progress value.
pub fn parse_progress(payload: &Value) -> Result<ProgressStatus> {
    let api_status = payload.get("api_status").and_then(as_code);

    if api_status == Some(201) {
        return Ok(ProgressStatus::Complete);
    }
    if payload.get("status").and_then(Value::as_str) == Some("Fail") {
        let message = payload
            .get("error_message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("unknown error");
        return Ok(ProgressStatus::Failed(message.to_string()));
    }
    if api_status == Some(200) {
        let percent = payload.get("progress").map(as_percent).unwrap_or(0);
        return Ok(ProgressStatus::Pending(percent));
    }

    Err(AppError::upstream(
        SERVICE,
        format!("unrecognized progress response: {payload}"),
    ))
}

fn as_code(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Progress is reported either as a whole percent (`45`) or as a
/// fraction (`0.45`).
fn as_percent(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) if n.is_f64() => n.as_f64().map(|f| if f <= 1.0 { f * 100.0 } else { f }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|f| f.is_finite())
        .map(|f| f.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::models::ArticleLength;

    fn generator(base_url: &str) -> ArticleGenerator {
        let config = GeneratorConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
        };
        ArticleGenerator::new(Client::new(), &config)
    }

    #[test]
    fn test_parse_progress_states() {
        assert_eq!(
            parse_progress(&json!({"api_status": 201})).unwrap(),
            ProgressStatus::Complete
        );
        assert_eq!(
            parse_progress(&json!({"api_status": 200, "progress": 30})).unwrap(),
            ProgressStatus::Pending(30)
        );
        assert_eq!(
            parse_progress(&json!({"api_status": 200, "progress": 0.7})).unwrap(),
            ProgressStatus::Pending(70)
        );
        assert_eq!(
            parse_progress(&json!({"status": "Fail", "error_message": "quota exceeded"})).unwrap(),
            ProgressStatus::Failed("quota exceeded".into())
        );
    }

    #[test]
    fn test_parse_progress_precedence() {
        // completion beats a failure flag, failure beats "still running"
        assert_eq!(
            parse_progress(&json!({"api_status": 201, "status": "Fail"})).unwrap(),
            ProgressStatus::Complete
        );
        assert_eq!(
            parse_progress(&json!({"api_status": 200, "status": "Fail"})).unwrap(),
            ProgressStatus::Failed("unknown error".into())
        );
    }

    #[test]
    fn test_parse_progress_rejects_unknown_shapes() {
        assert!(parse_progress(&json!({})).is_err());
        assert!(parse_progress(&json!({"api_status": 500})).is_err());
        assert!(parse_progress(&json!(null)).is_err());
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(as_percent(&json!(140)), 100);
        assert_eq!(as_percent(&json!(-3)), 0);
        assert_eq!(as_percent(&json!("55")), 55);
        assert_eq!(as_percent(&json!(null)), 0);
    }

    #[tokio::test]
    async fn test_initiate_sends_request_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/initiate_article")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "test-key".into()),
                Matcher::UrlEncoded("keyword".into(), "typhoon warning".into()),
                Matcher::UrlEncoded("length".into(), "medium".into()),
                Matcher::UrlEncoded("excluded_topics".into(), "sports".into()),
                Matcher::UrlEncoded("image".into(), "0.5".into()),
                Matcher::UrlEncoded("video".into(), "0".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ref_key": 987654}"#)
            .create_async()
            .await;

        let request = GenerationRequest::new(
            "typhoon warning",
            ArticleLength::Medium,
            "sports",
            "",
            0.5,
            0.0,
        )
        .unwrap();
        let handle = generator(&server.url()).initiate(&request).await.unwrap();

        assert_eq!(handle.ref_key(), "987654");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_initiate_without_ref_key_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/initiate_article")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status": "Fail", "error_message": "invalid key"}"#)
            .create_async()
            .await;

        let request = GenerationRequest::for_keyword("typhoon").unwrap();
        let err = generator(&server.url()).initiate(&request).await.unwrap_err();

        match err {
            AppError::Upstream { service, message } => {
                assert_eq!(service, "generator");
                assert_eq!(message, "invalid key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_poll_progress_uses_ref_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/get_api_progress")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "test-key".into()),
                Matcher::UrlEncoded("ref_key".into(), "abc".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"api_status": 200, "progress": 45}"#)
            .create_async()
            .await;

        let generator = generator(&server.url());
        let handle = generator.resume("abc");
        let status = generator.poll_progress(&handle).await.unwrap();

        assert_eq!(status, ProgressStatus::Pending(45));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_progress_empty_body_is_transient_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/get_api_progress")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let generator = generator(&server.url());
        let handle = generator.resume("abc");
        let err = generator.poll_progress(&handle).await.unwrap_err();

        assert!(matches!(err, AppError::Upstream { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_superseded_handle_is_rejected_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/get_api_progress")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let generator = generator(&server.url());
        let first = generator.resume("first");
        let second = generator.resume("second");

        assert!(!generator.is_current(&first));
        assert!(generator.is_current(&second));
        let err = generator.poll_progress(&first).await.unwrap_err();
        assert!(matches!(err, AppError::StaleHandle(ref key) if key == "first"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_handle_superseded_during_poll_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let generator = std::sync::Arc::new(generator(&server.url()));

        // another job takes over while this poll is in flight
        let shared = std::sync::Arc::clone(&generator);
        let mock = server
            .mock("POST", "/api/get_api_progress")
            .match_query(Matcher::UrlEncoded("ref_key".into(), "first".into()))
            .with_status(200)
            .with_body_from_request(move |_| {
                shared.resume("second");
                br#"{"api_status": 201}"#.to_vec()
            })
            .create_async()
            .await;

        let first = generator.resume("first");
        let err = generator.poll_progress(&first).await.unwrap_err();

        assert!(matches!(err, AppError::StaleHandle(ref key) if key == "first"));
        assert!(!generator.is_current(&first));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_article_returns_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/view_article")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "test-key".into()),
                Matcher::UrlEncoded("article_id".into(), "abc".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": "<p>Storm nears Luzon.</p>"}"#)
            .create_async()
            .await;

        let generator = generator(&server.url());
        let completed = CompletedGeneration::new(generator.resume("abc"));
        let article = generator.fetch_article(&completed).await.unwrap();

        assert_eq!(article.ref_key, "abc");
        assert_eq!(article.body_html, "<p>Storm nears Luzon.</p>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_article_without_data_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/view_article")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status": "Success"}"#)
            .create_async()
            .await;

        let generator = generator(&server.url());
        let completed = CompletedGeneration::new(generator.resume("abc"));
        let err = generator.fetch_article(&completed).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { .. }));
    }
}
