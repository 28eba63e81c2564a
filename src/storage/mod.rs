//! Storage backends for the draft template.
//!
//! The template is a JSON document describing the default shape of a new
//! CMS item. Locally it sits next to the config; in Lambda it is usually
//! read from S3.

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DraftTemplate, TemplateConfig};

pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// Source of raw documents, addressed by key.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Read a document, returning `None` when it does not exist.
    async fn read_bytes_optional(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Human-readable location of `key`, for messages.
    fn describe(&self, key: &str) -> String;

    /// Load and parse the draft template stored under `key`.
    async fn load_template(&self, key: &str) -> Result<DraftTemplate> {
        let bytes = self.read_bytes_optional(key).await?.ok_or_else(|| {
            crate::error::AppError::config(format!(
                "draft template not found at {}",
                self.describe(key)
            ))
        })?;
        let template = DraftTemplate::from_slice(&bytes)?;
        log::info!("Loaded draft template from {}", self.describe(key));
        Ok(template)
    }
}

/// Load the template from wherever the configuration points.
///
/// An S3 key wins when the `s3` feature is enabled; otherwise the local
/// path is resolved against `base_dir`.
pub async fn load_configured_template(
    config: &TemplateConfig,
    base_dir: &Path,
) -> Result<DraftTemplate> {
    #[cfg(feature = "s3")]
    {
        if let Some(key) = &config.s3_key {
            let storage = S3Storage::from_env().await?;
            return storage.load_template(key).await;
        }
    }
    #[cfg(not(feature = "s3"))]
    {
        if let Some(key) = &config.s3_key {
            log::warn!(
                "Ignoring template.s3_key '{}': built without the s3 feature",
                key
            );
        }
    }

    let path = config.local_path(base_dir);
    let (dir, file) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(file)) => (dir.to_path_buf(), file.to_string_lossy().into_owned()),
        _ => (base_dir.to_path_buf(), config.path.clone()),
    };
    LocalStorage::new(dir).load_template(&file).await
}
