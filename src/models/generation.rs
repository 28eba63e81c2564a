//! Article generation request and job state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};

/// Maximum length of the free-form instructions, in user-perceived characters.
pub const MAX_INSTRUCTIONS_CHARS: usize = 500;

/// Target article length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleLength {
    /// About 250 words
    #[default]
    Short,
    /// About 500 words
    Medium,
    /// About 750 words
    Long,
    /// About 1000 words
    Longer,
}

impl ArticleLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleLength::Short => "short",
            ArticleLength::Medium => "medium",
            ArticleLength::Long => "long",
            ArticleLength::Longer => "longer",
        }
    }
}

impl fmt::Display for ArticleLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleLength {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(ArticleLength::Short),
            "medium" => Ok(ArticleLength::Medium),
            "long" => Ok(ArticleLength::Long),
            "longer" => Ok(ArticleLength::Longer),
            other => Err(AppError::validation(format!(
                "unknown article length '{other}' (expected short, medium, long or longer)"
            ))),
        }
    }
}

/// Parameters for one article generation job.
///
/// Fields are private so a request can only be built through
/// [`GenerationRequest::new`], and cannot change once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    keyword: String,
    length: ArticleLength,
    excluded_topics: String,
    instructions: String,
    image: f64,
    video: f64,
}

/// Wire shape of a request, as received from a Lambda event or a file.
#[derive(Debug, Deserialize)]
struct RawGenerationRequest {
    keyword: String,
    #[serde(default)]
    length: ArticleLength,
    #[serde(default)]
    excluded_topics: String,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    image: f64,
    #[serde(default)]
    video: f64,
}

impl<'de> Deserialize<'de> for GenerationRequest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawGenerationRequest::deserialize(deserializer)?;
        GenerationRequest::new(
            raw.keyword,
            raw.length,
            raw.excluded_topics,
            raw.instructions,
            raw.image,
            raw.video,
        )
        .map_err(serde::de::Error::custom)
    }
}

impl GenerationRequest {
    pub fn new(
        keyword: impl Into<String>,
        length: ArticleLength,
        excluded_topics: impl Into<String>,
        instructions: impl Into<String>,
        image: f64,
        video: f64,
    ) -> Result<Self> {
        let keyword = keyword.into();
        let instructions = instructions.into();

        if keyword.trim().is_empty() {
            return Err(AppError::validation("keyword must not be empty"));
        }
        let count = instructions.graphemes(true).count();
        if count > MAX_INSTRUCTIONS_CHARS {
            return Err(AppError::validation(format!(
                "instructions are {count} characters long, limit is {MAX_INSTRUCTIONS_CHARS}"
            )));
        }
        check_probability("image", image)?;
        check_probability("video", video)?;

        Ok(Self {
            keyword,
            length,
            excluded_topics: excluded_topics.into(),
            instructions,
            image,
            video,
        })
    }

    /// Request with only a keyword, everything else at its default.
    pub fn for_keyword(keyword: impl Into<String>) -> Result<Self> {
        Self::new(keyword, ArticleLength::default(), "", "", 0.0, 0.0)
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn length(&self) -> ArticleLength {
        self.length
    }

    pub fn excluded_topics(&self) -> &str {
        &self.excluded_topics
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn image_probability(&self) -> f64 {
        self.image
    }

    pub fn video_probability(&self) -> f64 {
        self.video
    }

    /// Query parameters for the initiate call, excluding the API key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("keyword", self.keyword.clone()),
            ("length", self.length.to_string()),
            ("excluded_topics", self.excluded_topics.clone()),
            ("instructions", self.instructions.clone()),
            ("image", self.image.to_string()),
            ("video", self.video.to_string()),
        ]
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "{name} probability must be within [0, 1], got {value}"
        )))
    }
}

/// Correlation key of a submitted generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    ref_key: String,
    epoch: u64,
}

impl GenerationHandle {
    pub(crate) fn new(ref_key: String, epoch: u64) -> Self {
        Self { ref_key, epoch }
    }

    pub fn ref_key(&self) -> &str {
        &self.ref_key
    }

    /// Sequence number of the initiate call that produced this handle.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Display for GenerationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ref_key)
    }
}

/// State of a generation job as of the latest poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    /// Still running, with a completion percentage in 0..=100
    Pending(u8),
    Complete,
    Failed(String),
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Pending(_))
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStatus::Pending(percent) => write!(f, "pending ({percent}%)"),
            ProgressStatus::Complete => f.write_str("complete"),
            ProgressStatus::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Proof that a generation job reached [`ProgressStatus::Complete`].
///
/// Only the progress monitor can construct one, so the article can never
/// be fetched for a job that has not finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedGeneration {
    handle: GenerationHandle,
}

impl CompletedGeneration {
    pub(crate) fn new(handle: GenerationHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &GenerationHandle {
        &self.handle
    }

    pub fn ref_key(&self) -> &str {
        self.handle.ref_key()
    }
}

/// Generated article text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArticle {
    pub ref_key: String,
    pub body_html: String,
}
