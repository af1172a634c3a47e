use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::visible_text;
use crate::config::ParagraphStyleRule;

static PARAGRAPH_INNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p[^>]*>(.*)</p>").unwrap());

/// One paragraph class mapped to a ScreenSteps block style.
pub struct ParagraphStyle {
    style: String,
    /// A maximal run of consecutive paragraphs carrying the class.
    run: Regex,
    paragraph: Regex,
}

impl ParagraphStyle {
    pub fn new(rule: &ParagraphStyleRule) -> Result<Self, regex::Error> {
        let class = regex::escape(&rule.class);
        let paragraph = format!(r#"<p\s+class="[^"]*\b{class}\b[^"]*".*?</p>"#);
        Ok(Self {
            style: rule.style.clone(),
            run: Regex::new(&format!(r"(?s)(?:{paragraph}\s*)+"))?,
            paragraph: Regex::new(&format!("(?s){paragraph}"))?,
        })
    }

    /// Wrap each run's text paragraphs in one styled block. Image-only
    /// paragraphs follow the block; paragraphs with neither text nor an
    /// image are dropped unless `drop_empty` is off.
    pub fn apply(&self, html: &str, drop_empty: bool) -> String {
        self.run
            .replace_all(html, |caps: &Captures| self.regroup(&caps[0], drop_empty))
            .into_owned()
    }

    fn regroup(&self, run: &str, drop_empty: bool) -> String {
        let mut styled = String::new();
        let mut after = String::new();

        for p in self.paragraph.find_iter(run).map(|m| m.as_str()) {
            let inner = PARAGRAPH_INNER
                .captures(p)
                .and_then(|caps| caps.get(1))
                .map_or("", |m| m.as_str());
            if !visible_text(inner).is_empty() {
                styled.push_str(p);
            } else if p.contains("<img") || !drop_empty {
                after.push_str(p);
            }
        }

        if styled.is_empty() {
            return after;
        }
        format!(
            r#"<div class="screensteps-styled-block" data-style="{}">{styled}</div>{after}"#,
            self.style
        )
    }
}
