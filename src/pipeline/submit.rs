// src/pipeline/submit.rs

//! Two-phase draft submission.
//!
//! The CMS cannot create an item with its metadata in one call, so a draft
//! is created first and then patched. If the patch fails, the fresh draft
//! is deleted so no half-filled item is left on the desk.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{ArticleDraft, DraftTemplate, TaskRef};
use crate::services::CmsClient;

/// Create a draft and apply `fields` to it as one logical unit.
pub async fn submit_draft(
    cms: &CmsClient,
    template: &DraftTemplate,
    body_html: &str,
    task: TaskRef,
    fields: &Map<String, Value>,
) -> Result<ArticleDraft> {
    let draft = cms.create_draft(template, body_html, task).await?;

    match cms.patch_draft(&draft, fields).await {
        Ok(patched) => Ok(patched),
        Err(patch_err) => {
            log::warn!(
                "Patching draft {} failed, removing it: {}",
                draft.id,
                patch_err
            );
            if let Err(delete_err) = cms.delete_draft(&draft).await {
                log::error!(
                    "Could not remove draft {} after failed patch, it must be cleaned up by hand: {}",
                    draft.id,
                    delete_err
                );
            }
            Err(patch_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;

    use super::*;
    use crate::error::AppError;
    use crate::models::{CmsConfig, CmsSession};

    async fn logged_in(server: &mut mockito::Server) -> CmsClient {
        server
            .mock("POST", "/auth_db")
            .with_status(200)
            .with_body(r#"{"token": "tok", "user": "user-1"}"#)
            .create_async()
            .await;
        let config = CmsConfig {
            base_url: server.url(),
            ..CmsConfig::default()
        };
        let mut cms = CmsClient::new(Client::new(), &config);
        let session: CmsSession = cms.login("writer", "secret").await.unwrap();
        assert_eq!(session.user_id, "user-1");
        cms
    }

    fn task() -> TaskRef {
        TaskRef {
            desk: "desk-1".into(),
            stage: "stage-1".into(),
            user: "user-1".into(),
        }
    }

    fn slugline(value: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("slugline".into(), json!(value));
        fields
    }

    #[tokio::test]
    async fn test_create_then_patch() {
        let mut server = mockito::Server::new_async().await;
        let cms = logged_in(&mut server).await;
        server
            .mock("POST", "/archive")
            .with_status(201)
            .with_body(r#"{"_id": "item-1", "_etag": "123"}"#)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/archive/item-1")
            .match_header("if-match", "123")
            .with_status(200)
            .with_body(r#"{"_id": "item-1", "_etag": "456"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/archive/item-1")
            .expect(0)
            .create_async()
            .await;

        let draft = submit_draft(&cms, &DraftTemplate::default(), "<p/>", task(), &slugline("k"))
            .await
            .unwrap();

        assert_eq!(draft.etag, "456");
        patch.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_patch_deletes_draft() {
        let mut server = mockito::Server::new_async().await;
        let cms = logged_in(&mut server).await;
        server
            .mock("POST", "/archive")
            .with_status(201)
            .with_body(r#"{"_id": "item-1", "_etag": "123"}"#)
            .create_async()
            .await;
        server
            .mock("PATCH", "/archive/item-1")
            .with_status(412)
            .with_body("etag mismatch")
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/archive/item-1")
            .match_header("if-match", "123")
            .match_header("authorization", Matcher::Regex("^Bearer tok$".into()))
            .with_status(204)
            .create_async()
            .await;

        let err = submit_draft(&cms, &DraftTemplate::default(), "<p/>", task(), &slugline("k"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict { .. }));
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_patch_error() {
        let mut server = mockito::Server::new_async().await;
        let cms = logged_in(&mut server).await;
        server
            .mock("POST", "/archive")
            .with_status(201)
            .with_body(r#"{"_id": "item-1", "_etag": "123"}"#)
            .create_async()
            .await;
        server
            .mock("PATCH", "/archive/item-1")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("DELETE", "/archive/item-1")
            .with_status(500)
            .create_async()
            .await;

        let err = submit_draft(&cms, &DraftTemplate::default(), "<p/>", task(), &slugline("k"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { .. }));
    }
}
