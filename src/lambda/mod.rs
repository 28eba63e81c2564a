// src/lambda/mod.rs

//! AWS Lambda handler for the article workflow.
//!
//! Each invocation carries one generation request. The handler:
//! 1. Loads config (S3, bundled file or environment) and the draft template
//! 2. Generates the article and waits for it
//! 3. Files it as a draft on the configured desk and stage
//!
//! The response mirrors an API Gateway proxy result so the function can sit
//! behind one unchanged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::load_lambda_config;
use crate::error::{AppError, Result};
use crate::models::{GenerationRequest, PollingConfig, ProgressStatus};
use crate::pipeline::{PublishContext, PublishReport, run_publish};
use crate::storage::load_configured_template;

/// Time kept after polling for fetching the article and filing the draft.
const DEADLINE_RESERVE: Duration = Duration::from_secs(30);

/// How long before the deadline an unfinished wait is cancelled.
const DEADLINE_CANCEL_MARGIN: Duration = Duration::from_secs(10);

/// Lambda response payload.
#[derive(Debug, Serialize)]
pub struct LambdaResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// Patched CMS record on success, `{"error": ...}` otherwise
    pub body: Value,
}

impl LambdaResponse {
    fn ok(report: PublishReport) -> Self {
        Self {
            status_code: 200,
            body: report.record,
        }
    }

    fn from_error(err: &AppError) -> Self {
        Self {
            status_code: status_for(err),
            body: json!({ "error": err.to_string() }),
        }
    }
}

/// HTTP status reported for a failed invocation.
fn status_for(err: &AppError) -> u16 {
    match err {
        AppError::Validation(_) => 400,
        AppError::Auth(_) => 401,
        AppError::NotFound { .. } => 404,
        AppError::Conflict { .. } => 409,
        AppError::PollTimeout { .. } => 504,
        AppError::Config(_) | AppError::Toml(_) | AppError::Io(_) | AppError::S3(_) => 500,
        _ => 502,
    }
}

/// Main Lambda handler function.
#[instrument(skip(event), fields(request_id = %event.context.request_id))]
pub async fn handler(event: LambdaEvent<Value>) -> std::result::Result<LambdaResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (payload, context) = event.into_parts();
    let remaining = time_left(context.deadline, Utc::now().timestamp_millis());

    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(e) => {
            error!("Rejected invocation: {}", e);
            return Ok(LambdaResponse::from_error(&e));
        }
    };
    info!(
        "Starting publish: keyword={:?}, length={}",
        request.keyword(),
        request.length()
    );

    match publish(&request, remaining).await {
        Ok(report) => {
            info!(
                "Published {} as draft {} in {}ms",
                report.ref_key,
                report.draft_id,
                start.elapsed().as_millis()
            );
            Ok(LambdaResponse::ok(report))
        }
        Err(e) => {
            error!("Publish failed: {}", e);
            Ok(LambdaResponse::from_error(&e))
        }
    }
}

fn parse_request(payload: Value) -> Result<GenerationRequest> {
    serde_json::from_value(payload)
        .map_err(|e| AppError::validation(format!("invalid request: {e}")))
}

/// Time left before the runtime stops the invocation, if it set a deadline.
fn time_left(deadline_ms: u64, now_ms: i64) -> Option<Duration> {
    if deadline_ms == 0 {
        return None;
    }
    let left = i64::try_from(deadline_ms).unwrap_or(i64::MAX).saturating_sub(now_ms);
    Some(Duration::from_millis(u64::try_from(left).unwrap_or(0)))
}

/// Shrink the polling budget so the run ends with `PollTimeout` before the
/// runtime deadline, keeping `DEADLINE_RESERVE` for the fetch and CMS calls.
fn fit_to_deadline(polling: &mut PollingConfig, remaining: Duration) {
    let available = remaining.saturating_sub(DEADLINE_RESERVE).as_secs().max(1);
    if available < polling.max_duration_secs {
        warn!(
            "Capping poll budget at {}s (configured {}s) to finish before the Lambda deadline",
            available, polling.max_duration_secs
        );
        polling.max_duration_secs = available;
    }
}

async fn publish(request: &GenerationRequest, remaining: Option<Duration>) -> Result<PublishReport> {
    let mut config = load_lambda_config().await?;
    if let Some(remaining) = remaining {
        fit_to_deadline(&mut config.polling, remaining);
    }

    let task_root = std::env::var("LAMBDA_TASK_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let template = load_configured_template(&config.template, &task_root).await?;

    let ctx = PublishContext::new(Arc::new(config), template)?;

    // backstop for polls still in flight when the deadline is near
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watchdog = remaining.map(|remaining| {
        tokio::spawn(async move {
            tokio::time::sleep(remaining.saturating_sub(DEADLINE_CANCEL_MARGIN)).await;
            warn!("Lambda deadline approaching, cancelling generation wait");
            trigger.cancel();
        })
    });

    let result = run_publish(&ctx, request, cancel, log_progress).await;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    result
}

fn log_progress(status: &ProgressStatus) {
    match status {
        ProgressStatus::Pending(percent) => info!(percent = *percent, "Generation in progress"),
        other => info!("Generation {}", other),
    }
}
