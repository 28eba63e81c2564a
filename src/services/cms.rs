// src/services/cms.rs

//! Newsroom CMS client.
//!
//! Logs in once per flow and keeps the session for the calls that follow:
//! desk and stage lookups, draft creation, and conditional updates keyed
//! on the draft's etag.

use reqwest::header::IF_MATCH;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value, json};

use crate::error::{AppError, Result};
use crate::models::{ArticleDraft, CmsConfig, CmsSession, DeskStageRef, DraftTemplate, TaskRef};
use crate::utils::http::{endpoint, snippet};
use crate::utils::scalar_to_string;

const SERVICE: &str = "cms";

/// Session-holding client for the CMS REST API.
pub struct CmsClient {
    client: Client,
    base_url: String,
    session: Option<CmsSession>,
}

impl CmsClient {
    pub fn new(client: Client, config: &CmsConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            session: None,
        }
    }

    /// Authenticate and keep the session for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<CmsSession> {
        let url = endpoint(&self.base_url, &["auth_db"])?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::auth(format!(
                "login as '{username}' rejected with HTTP {status}: {}",
                snippet(&body)
            )));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::auth(format!("unreadable login response: {e}")))?;
        let token = payload.get("token").and_then(scalar_to_string);
        let user_id = payload.get("user").and_then(|user| match user {
            Value::Object(fields) => fields.get("_id").and_then(scalar_to_string),
            other => scalar_to_string(other),
        });

        let (Some(token), Some(user_id)) = (token, user_id) else {
            return Err(AppError::auth("login response is missing token or user"));
        };

        log::info!("Logged in to CMS as '{}'", username);
        let session = CmsSession { token, user_id };
        self.session = Some(session.clone());
        Ok(session)
    }

    pub fn session(&self) -> Result<&CmsSession> {
        self.session
            .as_ref()
            .ok_or_else(|| AppError::auth("not logged in to the CMS"))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(builder.bearer_auth(&self.session()?.token))
    }

    /// Look up a desk id by name.
    pub async fn resolve_desk(&self, name: &str) -> Result<String> {
        self.first_id("desks", "desk", name, json!({ "name": name }))
            .await
    }

    /// Look up a stage id by name within a desk.
    pub async fn resolve_stage(&self, name: &str, desk_id: &str) -> Result<String> {
        self.first_id(
            "stages",
            "stage",
            name,
            json!({ "desk": desk_id, "name": name }),
        )
        .await
    }

    /// Resolve both halves of a draft's placement.
    pub async fn resolve_location(&self, desk_name: &str, stage_name: &str) -> Result<DeskStageRef> {
        let desk_id = self.resolve_desk(desk_name).await?;
        let stage_id = self.resolve_stage(stage_name, &desk_id).await?;
        log::debug!(
            "Resolved desk '{}' -> {}, stage '{}' -> {}",
            desk_name,
            desk_id,
            stage_name,
            stage_id
        );
        Ok(DeskStageRef { desk_id, stage_id })
    }

    /// Run a filtered list query and return the first item's `_id`.
    async fn first_id(
        &self,
        resource: &str,
        kind: &'static str,
        name: &str,
        filter: Value,
    ) -> Result<String> {
        let url = endpoint(&self.base_url, &[resource])?;
        let request = self
            .client
            .get(url)
            .query(&[("where", filter.to_string())]);
        let response = self.authorized(request)?.send().await?;
        let body = check(response, None).await?;

        let payload: Value = serde_json::from_str(&body)?;
        let items = payload
            .get("_items")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::upstream(SERVICE, format!("{resource} response has no _items")))?;

        let first = items.first().ok_or_else(|| AppError::not_found(kind, name))?;
        first
            .get("_id")
            .and_then(scalar_to_string)
            .ok_or_else(|| AppError::upstream(SERVICE, format!("{kind} '{name}' has no _id")))
    }

    /// Create a draft from the template, the article body, and its placement.
    pub async fn create_draft(
        &self,
        template: &DraftTemplate,
        body_html: &str,
        task: TaskRef,
    ) -> Result<ArticleDraft> {
        let payload = template.fill(body_html, &task)?;
        let url = endpoint(&self.base_url, &["archive"])?;
        let request = self.client.post(url).json(&payload);
        let response = self.authorized(request)?.send().await?;
        let body = check(response, None).await?;

        let record: Value = serde_json::from_str(&body)?;
        let draft = ArticleDraft::from_created(record, body_html, task)?;
        log::info!("Created draft {} (etag {})", draft.id, draft.etag);
        Ok(draft)
    }

    /// Update a draft, guarded by its current etag.
    pub async fn patch_draft(
        &self,
        draft: &ArticleDraft,
        fields: &Map<String, Value>,
    ) -> Result<ArticleDraft> {
        let url = endpoint(&self.base_url, &["archive", &draft.id])?;
        let request = self
            .client
            .patch(url)
            .header(IF_MATCH, &draft.etag)
            .json(fields);
        let response = self.authorized(request)?.send().await?;
        let body = check(response, Some(&draft.id)).await?;

        let returned = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body)?
        };
        let mut updated = draft.clone();
        updated.apply_patch(fields, returned);
        log::info!("Patched draft {} (etag {})", updated.id, updated.etag);
        Ok(updated)
    }

    /// Delete a draft, guarded by its current etag.
    pub async fn delete_draft(&self, draft: &ArticleDraft) -> Result<()> {
        let url = endpoint(&self.base_url, &["archive", &draft.id])?;
        let request = self.client.delete(url).header(IF_MATCH, &draft.etag);
        let response = self.authorized(request)?.send().await?;
        check(response, Some(&draft.id)).await?;
        log::info!("Deleted draft {}", draft.id);
        Ok(())
    }
}

/// Map CMS status codes onto the error taxonomy and return the body.
async fn check(response: Response, record_id: Option<&str>) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    match status {
        s if s.is_success() => Ok(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::auth(format!(
            "HTTP {status}: {}",
            snippet(&body)
        ))),
        StatusCode::PRECONDITION_FAILED | StatusCode::PRECONDITION_REQUIRED => {
            Err(AppError::conflict(
                record_id.unwrap_or("unknown"),
                format!("HTTP {status}: {}", snippet(&body)),
            ))
        }
        _ => Err(AppError::upstream(
            SERVICE,
            format!("HTTP {status}: {}", snippet(&body)),
        )),
    }
}
