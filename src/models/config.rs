//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Article generation API
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Newsroom CMS
    #[serde(default)]
    pub cms: CmsConfig,

    /// Progress polling bounds
    #[serde(default)]
    pub polling: PollingConfig,

    /// Trending topics feed
    #[serde(default)]
    pub trends: TrendsConfig,

    /// Draft template source
    #[serde(default)]
    pub template: TemplateConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Variable names follow the deployment environment the workflow has
    /// always used (`ARTICLEFORGE_API_KEY`, `WORKBENCH_API`, ...).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ARTICLEFORGE_API_KEY") {
            self.generator.api_key = v;
        }
        if let Some(v) = get("ARTICLEFORGE_API") {
            self.generator.base_url = v;
        }
        if let Some(v) = get("WORKBENCH_API") {
            self.cms.base_url = v;
        }
        if let Some(v) = get("SUPERDESK_USERNAME") {
            self.cms.username = v;
        }
        if let Some(v) = get("SUPERDESK_PASSWORD") {
            self.cms.password = v;
        }
        if let Some(v) = get("DESK_NAME") {
            self.cms.desk_name = v;
        }
        if let Some(v) = get("STAGE_NAME") {
            self.cms.stage_name = v;
        }
        if let Some(v) = get("TEMPLATE_PATH") {
            self.template.path = v;
        }
        if let Some(v) = get("TEMPLATE_S3_KEY") {
            self.template.s3_key = Some(v);
        }
        if let Some(v) = get("TRENDS_URL") {
            self.trends.url = v;
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http.timeout_secs = secs;
        }
        if let Some(secs) = get("POLL_MAX_DURATION_SECS").and_then(|v| v.parse().ok()) {
            self.polling.max_duration_secs = secs;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        self.validate_generator()?;
        if self.cms.base_url.trim().is_empty() {
            return Err(AppError::validation(
                "cms.base_url is empty (set WORKBENCH_API)",
            ));
        }
        if self.cms.username.trim().is_empty() || self.cms.password.is_empty() {
            return Err(AppError::validation(
                "cms credentials are missing (set SUPERDESK_USERNAME / SUPERDESK_PASSWORD)",
            ));
        }
        if self.cms.desk_name.trim().is_empty() {
            return Err(AppError::validation("cms.desk_name is empty"));
        }
        if self.cms.stage_name.trim().is_empty() {
            return Err(AppError::validation("cms.stage_name is empty"));
        }
        Ok(())
    }

    /// Check only what a generate or watch run needs: HTTP, the generator
    /// API and the polling bounds.
    pub fn validate_generator(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(AppError::validation("generator.base_url is empty"));
        }
        if self.generator.api_key.trim().is_empty() {
            return Err(AppError::validation(
                "generator.api_key is empty (set ARTICLEFORGE_API_KEY)",
            ));
        }
        self.polling.validate()
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Article generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "defaults::generator_url")]
    pub base_url: String,

    /// API key passed as the `key` query parameter
    #[serde(default)]
    pub api_key: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::generator_url(),
            api_key: String::new(),
        }
    }
}

/// Newsroom CMS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmsConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Desk the draft is routed to
    #[serde(default)]
    pub desk_name: String,

    /// Stage on that desk
    #[serde(default)]
    pub stage_name: String,
}

/// Bounds for the generation progress loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Wait between polls while the job reports progress
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,

    /// First backoff after a transient failure
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,

    /// Random extra delay as a fraction of the backoff (0.0 disables)
    #[serde(default = "defaults::jitter")]
    pub jitter: f64,

    /// Consecutive transient failures tolerated before giving up
    #[serde(default = "defaults::max_transient_failures")]
    pub max_transient_failures: u32,

    /// Overall time budget for one generation job
    #[serde(default = "defaults::max_duration")]
    pub max_duration_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.initial_backoff_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Reject bounds the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(AppError::validation(
                "polling.multiplier must be a finite number >= 1.0",
            ));
        }
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(AppError::validation("polling.jitter must be within [0, 1]"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(AppError::validation(
                "polling.max_backoff_ms must be >= polling.initial_backoff_ms",
            ));
        }
        if self.max_duration_secs == 0 {
            return Err(AppError::validation(
                "polling.max_duration_secs must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::interval_ms(),
            initial_backoff_ms: defaults::initial_backoff_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
            multiplier: defaults::multiplier(),
            jitter: defaults::jitter(),
            max_transient_failures: defaults::max_transient_failures(),
            max_duration_secs: defaults::max_duration(),
        }
    }
}

/// Trending topics feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsConfig {
    #[serde(default = "defaults::trends_url")]
    pub url: String,

    #[serde(default = "defaults::trends_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            url: defaults::trends_url(),
            timeout_secs: defaults::trends_timeout(),
        }
    }
}

/// Where the draft template document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Local JSON file
    #[serde(default = "defaults::template_path")]
    pub path: String,

    /// S3 object key, preferred over `path` when the `s3` feature is on
    #[serde(default)]
    pub s3_key: Option<String>,
}

impl TemplateConfig {
    /// Resolve the local template path against a base directory.
    pub fn local_path(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: defaults::template_path(),
            s3_key: None,
        }
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; forge-writer/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn generator_url() -> String {
        "https://af.articleforge.com".into()
    }
    pub fn interval_ms() -> u64 {
        1000
    }
    pub fn initial_backoff_ms() -> u64 {
        1000
    }
    pub fn max_backoff_ms() -> u64 {
        30_000
    }
    pub fn multiplier() -> f64 {
        2.0
    }
    pub fn jitter() -> f64 {
        0.2
    }
    pub fn max_transient_failures() -> u32 {
        8
    }
    pub fn max_duration() -> u64 {
        900
    }
    pub fn trends_url() -> String {
        "https://qa-content-api.abs-cbn.com/QA/trending/googleTrends".into()
    }
    pub fn trends_timeout() -> u64 {
        5
    }
    pub fn template_path() -> String {
        "create_template.json".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn complete_config() -> Config {
        let mut config = Config::default();
        config.generator.api_key = "af-key".into();
        config.cms.base_url = "https://cms.example.com/api".into();
        config.cms.username = "writer".into();
        config.cms.password = "secret".into();
        config.cms.desk_name = "News".into();
        config.cms.stage_name = "Working Stage".into();
        config
    }

    #[test]
    fn validate_complete_config_ok() {
        assert!(complete_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_api_key() {
        let mut config = complete_config();
        config.generator.api_key = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_generator_ignores_cms_section() {
        let mut config = Config::default();
        config.generator.api_key = "af-key".into();
        assert!(config.validate_generator().is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_generator_checks_polling_bounds() {
        let mut config = Config::default();
        config.generator.api_key = "af-key".into();
        config.polling = toml::from_str("jitter = nan").unwrap();
        assert!(matches!(
            config.validate_generator(),
            Err(AppError::Validation(ref m)) if m.contains("jitter")
        ));

        config.polling = toml::from_str("multiplier = inf").unwrap();
        assert!(config.validate_generator().is_err());

        config.polling = toml::from_str("max_duration_secs = 0").unwrap();
        assert!(config.validate_generator().is_err());
    }

    #[test]
    fn validate_rejects_inverted_backoff_bounds() {
        let mut config = complete_config();
        config.polling.max_backoff_ms = 10;
        config.polling.initial_backoff_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_use_workflow_variable_names() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ARTICLEFORGE_API_KEY", "k-123"),
            ("WORKBENCH_API", "https://cms.local/api"),
            ("DESK_NAME", "Sports"),
            ("STAGE_NAME", ""),
            ("POLL_MAX_DURATION_SECS", "60"),
        ]);
        let mut config = Config::default();
        config.cms.stage_name = "Incoming".into();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.generator.api_key, "k-123");
        assert_eq!(config.cms.base_url, "https://cms.local/api");
        assert_eq!(config.cms.desk_name, "Sports");
        // blank values do not clobber configured ones
        assert_eq!(config.cms.stage_name, "Incoming");
        assert_eq!(config.polling.max_duration_secs, 60);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let polling = PollingConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            multiplier: 2.0,
            ..PollingConfig::default()
        };
        assert_eq!(polling.backoff(1), Duration::from_millis(100));
        assert_eq!(polling.backoff(2), Duration::from_millis(200));
        assert_eq!(polling.backoff(3), Duration::from_millis(350));
        assert_eq!(polling.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[cms]\nbase_url = \"https://cms.example.com/api\"\ndesk_name = \"News\"\n\n[polling]\ninterval_ms = 250"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.cms.desk_name, "News");
        assert_eq!(config.polling.interval_ms, 250);
        assert_eq!(config.polling.max_transient_failures, 8);
        assert_eq!(config.generator.base_url, "https://af.articleforge.com");
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let config = Config::load_or_default("/nonexistent/forge.toml");
        assert_eq!(config.http.timeout_secs, 30);
    }
}
