// src/pipeline/publish.rs

//! End-to-end article flow: generate, then file as a CMS draft.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{
    ArticleDraft, Config, DeskStageRef, DraftTemplate, GeneratedArticle, GenerationHandle,
    GenerationRequest, ProgressStatus, TaskRef,
};
use crate::services::{ArticleGenerator, CmsClient, ProgressMonitor};
use crate::utils::http::create_client;

use super::submit::submit_draft;

/// Everything one flow needs, built once from configuration.
pub struct PublishContext {
    pub config: Arc<Config>,
    client: Client,
    template: DraftTemplate,
}

impl PublishContext {
    pub fn new(config: Arc<Config>, template: DraftTemplate) -> Result<Self> {
        let client = create_client(&config.http)?;
        Ok(Self::with_client(config, template, client))
    }

    pub fn with_client(config: Arc<Config>, template: DraftTemplate, client: Client) -> Self {
        Self {
            config,
            client,
            template,
        }
    }

    pub fn generator(&self) -> ArticleGenerator {
        ArticleGenerator::new(self.client.clone(), &self.config.generator)
    }

    pub fn cms(&self) -> CmsClient {
        CmsClient::new(self.client.clone(), &self.config.cms)
    }

    fn monitor(&self, cancel: CancellationToken) -> ProgressMonitor {
        ProgressMonitor::new(self.config.polling.clone(), cancel)
    }
}

/// Outcome of a completed flow.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub ref_key: String,
    pub draft_id: String,
    pub etag: String,
    pub slugline: Option<String>,
    pub location: DeskStageRef,
    /// Draft as last returned by the CMS
    pub record: Value,
    pub completed_at: DateTime<Utc>,
}

impl PublishReport {
    fn new(ref_key: &str, location: DeskStageRef, draft: ArticleDraft) -> Self {
        Self {
            ref_key: ref_key.to_string(),
            draft_id: draft.id,
            etag: draft.etag,
            slugline: draft.slugline,
            location,
            record: draft.record,
            completed_at: Utc::now(),
        }
    }
}

/// Generate an article and wait for its text.
pub async fn run_generate<F>(
    ctx: &PublishContext,
    request: &GenerationRequest,
    cancel: CancellationToken,
    observe: F,
) -> Result<GeneratedArticle>
where
    F: FnMut(&ProgressStatus),
{
    let generator = ctx.generator();
    let handle = generator.initiate(request).await?;
    finish_generation(ctx, &generator, &handle, cancel, observe).await
}

/// Wait for an already submitted job and fetch its text.
pub async fn run_watch<F>(
    ctx: &PublishContext,
    ref_key: &str,
    cancel: CancellationToken,
    observe: F,
) -> Result<GeneratedArticle>
where
    F: FnMut(&ProgressStatus),
{
    let generator = ctx.generator();
    let handle = generator.resume(ref_key);
    finish_generation(ctx, &generator, &handle, cancel, observe).await
}

async fn finish_generation<F>(
    ctx: &PublishContext,
    generator: &ArticleGenerator,
    handle: &GenerationHandle,
    cancel: CancellationToken,
    observe: F,
) -> Result<GeneratedArticle>
where
    F: FnMut(&ProgressStatus),
{
    let completed = ctx.monitor(cancel).run(generator, handle, observe).await?;
    generator.fetch_article(&completed).await
}

/// Run the whole flow: log in, generate, and file the article as a draft.
pub async fn run_publish<F>(
    ctx: &PublishContext,
    request: &GenerationRequest,
    cancel: CancellationToken,
    observe: F,
) -> Result<PublishReport>
where
    F: FnMut(&ProgressStatus),
{
    let cms_config = &ctx.config.cms;

    let mut cms = ctx.cms();
    let session = cms.login(&cms_config.username, &cms_config.password).await?;

    let article = run_generate(ctx, request, cancel, observe).await?;

    let location = cms
        .resolve_location(&cms_config.desk_name, &cms_config.stage_name)
        .await?;
    let task = TaskRef::new(&location, &session);

    let mut fields = Map::new();
    fields.insert("slugline".into(), Value::String(request.keyword().to_string()));

    let draft = submit_draft(&cms, &ctx.template, &article.body_html, task, &fields).await?;
    log::info!(
        "Article {} filed as draft {} on desk {} / stage {}",
        article.ref_key,
        draft.id,
        location.desk_id,
        location.stage_id
    );

    Ok(PublishReport::new(&article.ref_key, location, draft))
}
