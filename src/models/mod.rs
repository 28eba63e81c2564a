// src/models/mod.rs

//! Domain models for the article workflow.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod cms;
mod config;
mod generation;

// Re-export all public types
pub use cms::{ArticleDraft, CmsSession, DeskStageRef, DraftTemplate, TaskRef};
pub use config::{
    CmsConfig, Config, GeneratorConfig, HttpConfig, PollingConfig, TemplateConfig, TrendsConfig,
};
pub use generation::{
    ArticleLength, CompletedGeneration, GeneratedArticle, GenerationHandle, GenerationRequest,
    MAX_INSTRUCTIONS_CHARS, ProgressStatus,
};
