//! Service layer for the article workflow.
//!
//! This module contains the remote clients and the polling logic:
//! - Article generation API (`ArticleGenerator`)
//! - Progress polling state machine (`ProgressMonitor`)
//! - Newsroom CMS (`CmsClient`)
//! - Trending topics feed (`TrendsClient`)

mod cms;
mod generator;
mod monitor;
mod trends;

pub use cms::CmsClient;
pub use generator::{ArticleGenerator, parse_progress};
pub use monitor::{ProgressMonitor, ProgressSource};
pub use trends::{TrendingTopic, TrendsClient};
