//! Layered settings: embedded defaults, an optional TOML file, then
//! `VLP2SS_*` environment variables (nested keys joined with `__`).

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_TOML: &str = include_str!("../defaults/vlp2ss.default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rewrite: RewriteSettings,
    pub api: ApiSettings,
    pub upload: UploadSettings,
}

/// Class tables for the HTML rewriter. The export's class numbering is only
/// known from samples, so these stay data rather than code.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteSettings {
    pub bold_class: String,
    pub span_tags: Vec<SpanTagRule>,
    pub paragraph_styles: Vec<ParagraphStyleRule>,
    pub drop_empty_styled_paragraphs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpanTagRule {
    pub class: String,
    pub tag: InlineTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineTag {
    Strong,
    Em,
    Code,
    U,
}

impl InlineTag {
    pub fn name(self) -> &'static str {
        match self {
            InlineTag::Strong => "strong",
            InlineTag::Em => "em",
            InlineTag::Code => "code",
            InlineTag::U => "u",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParagraphStyleRule {
    pub class: String,
    pub style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub min_call_interval_ms: u64,
    pub default_retry_secs: u64,
    /// `None` keeps retrying rate-limited calls forever.
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,
}

impl ApiSettings {
    pub fn base_url_for(&self, account: &str) -> String {
        self.base_url
            .replace("{account}", account)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    pub verify_site: bool,
    pub publish_manual: bool,
    pub publish_articles: bool,
    pub image_error_placeholder: bool,
    pub title_suffix: String,
}

impl Settings {
    /// Defaults, then `file` (must exist when given), then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix("VLP2SS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Embedded defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_defaults() {
        let s = Settings::defaults().unwrap();
        assert_eq!(s.rewrite.bold_class, "c5");
        assert_eq!(s.rewrite.span_tags.len(), 5);
        assert_eq!(s.rewrite.span_tags[3].class, "c6");
        assert_eq!(s.rewrite.span_tags[3].tag, InlineTag::Code);
        let styles: Vec<_> = s
            .rewrite
            .paragraph_styles
            .iter()
            .map(|r| (r.class.as_str(), r.style.as_str()))
            .collect();
        assert_eq!(
            styles,
            vec![("c10", "introduction"), ("c44", "introduction"), ("c48", "info")]
        );
        assert_eq!(s.api.min_call_interval_ms, 1250);
        assert_eq!(s.api.default_retry_secs, 60);
        assert!(s.api.max_rate_limit_retries.is_none());
        assert!(!s.upload.image_error_placeholder);
    }

    #[test]
    fn user_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vlp2ss.toml");
        std::fs::write(
            &path,
            "[rewrite]\nbold_class = \"c9\"\n\n[api]\nmin_call_interval_ms = 0\nmax_rate_limit_retries = 3\n",
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.rewrite.bold_class, "c9");
        // untouched keys keep their defaults
        assert_eq!(s.rewrite.paragraph_styles.len(), 3);
        assert_eq!(s.api.min_call_interval_ms, 0);
        assert_eq!(s.api.max_rate_limit_retries, Some(3));
    }

    #[test]
    fn missing_user_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("does/not/exist.toml"))).is_err());
    }

    #[test]
    fn base_url_substitutes_account() {
        let s = Settings::defaults().unwrap();
        assert_eq!(
            s.api.base_url_for("acme"),
            "https://acme.screenstepslive.com/api/v2"
        );
    }
}
