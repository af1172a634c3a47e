//! Turns a node's raw VLP body into ScreenSteps-ready HTML.
//!
//! Passes run in a fixed order: entity decoding, YouTube embeds, paragraph
//! styles, inline spans, `<ol start>` removal, relative image paths.

pub mod paragraphs;
pub mod spans;
pub mod youtube;

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RewriteSettings;
use paragraphs::ParagraphStyle;
use spans::SpanRules;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static OL_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(<ol[^>]*) start="[^"]*""#).unwrap());
static RELATIVE_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src=(["'])\./"#).unwrap());

pub struct Rewriter {
    paragraph_styles: Vec<ParagraphStyle>,
    spans: SpanRules,
    drop_empty_styled_paragraphs: bool,
}

impl Rewriter {
    pub fn new(settings: &RewriteSettings) -> Result<Self, regex::Error> {
        let paragraph_styles = settings
            .paragraph_styles
            .iter()
            .map(ParagraphStyle::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            paragraph_styles,
            spans: SpanRules::from_settings(settings),
            drop_empty_styled_paragraphs: settings.drop_empty_styled_paragraphs,
        })
    }

    /// Full cleanup of one node body. Empty input stays empty.
    pub fn clean(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let html = decode_entities(raw);
        let mut html = youtube::convert_embeds(&html);
        for style in &self.paragraph_styles {
            html = style.apply(&html, self.drop_empty_styled_paragraphs);
        }
        let html = self.spans.rewrite(&html);
        let html = OL_START.replace_all(&html, "${1}");
        let html = RELATIVE_SRC.replace_all(&html, "src=${1}");
        html.trim().to_string()
    }
}

/// Exports double-encode entities (`&amp;gt;`), so decode twice.
pub fn decode_entities(raw: &str) -> String {
    let once = html_escape::decode_html_entities(raw);
    html_escape::decode_html_entities(&once).into_owned()
}

/// Text left after removing every tag, trimmed.
pub fn visible_text(html: &str) -> String {
    TAG.replace_all(html, "").trim().to_string()
}

/// Value of a quoted attribute (`"` or `'`) inside a single opening tag.
pub(crate) fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=");
    let mut from = 0;
    while let Some(pos) = tag[from..].find(&needle) {
        let start = from + pos;
        let quote_at = start + needle.len();
        let at_boundary = tag[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        match tag[quote_at..].chars().next() {
            Some(quote @ ('"' | '\'')) if at_boundary => {
                let value_start = quote_at + 1;
                let len = tag[value_start..].find(quote)?;
                return Some(&tag[value_start..value_start + len]);
            }
            _ => from = quote_at,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn rewriter() -> Rewriter {
        Rewriter::new(&Settings::defaults().unwrap().rewrite).unwrap()
    }

    #[test]
    fn decodes_double_encoded_entities() {
        assert_eq!(decode_entities("a &amp;gt; b &amp;amp; c"), "a > b & c");
        assert_eq!(decode_entities("&lt;p&gt;x&lt;/p&gt;"), "<p>x</p>");
    }

    #[test]
    fn third_decode_changes_nothing() {
        for input in ["&amp;lt;tag&amp;gt;", "&gt; plain &amp;quot;q&amp;quot;", "no entities"] {
            let twice = decode_entities(input);
            let thrice = html_escape::decode_html_entities(&twice).into_owned();
            assert_eq!(twice, thrice, "input: {input}");
        }
    }

    #[test]
    fn empty_body_stays_empty() {
        assert_eq!(rewriter().clean(""), "");
    }

    #[test]
    fn full_pipeline_on_encoded_body() {
        let raw = "  &lt;p&gt;Run &lt;span class=\"c5 c9\"&gt;ls&lt;/span&gt; &amp;amp;&amp;amp; exit&lt;/p&gt;\
                   &lt;ol class=\"lst\" start=\"3\"&gt;&lt;li&gt;x&lt;/li&gt;&lt;/ol&gt;\
                   &lt;img src=\"./images/a.png\"&gt;  ";
        assert_eq!(
            rewriter().clean(raw),
            "<p>Run <strong>ls</strong> && exit</p><ol class=\"lst\"><li>x</li></ol><img src=\"images/a.png\">"
        );
    }

    #[test]
    fn youtube_runs_before_spans() {
        let raw = r#"<div class="mediatag-thumb youtube-thumb" data-media-id="abc123"><span class="c5">Play</span></div><p><span class="c9">after</span></p>"#;
        let out = rewriter().clean(raw);
        assert!(out.starts_with(r#"<div class="html-embed"><iframe"#));
        assert!(out.contains("https://www.youtube.com/embed/abc123"));
        assert!(!out.contains("Play"));
        assert!(out.ends_with("<p>after</p>"));
    }

    #[test]
    fn single_quoted_relative_src_is_normalized() {
        assert_eq!(rewriter().clean("<img src='./a.png'>"), "<img src='a.png'>");
    }

    #[test]
    fn visible_text_strips_tags() {
        assert_eq!(visible_text("  <p><img src=\"a\"></p> "), "");
        assert_eq!(visible_text("<p>Hi <b>there</b></p>"), "Hi there");
    }

    #[test]
    fn attr_value_requires_boundary() {
        let tag = r#"<div data-class="x" class="a b" data-style="info">"#;
        assert_eq!(attr_value(tag, "class"), Some("a b"));
        assert_eq!(attr_value(tag, "data-style"), Some("info"));
        assert_eq!(attr_value(tag, "style"), None);
        assert_eq!(attr_value(tag, "id"), None);
    }

    #[test]
    fn attr_value_reads_single_quotes() {
        let tag = r#"<img alt="it's" src='a.png' width=5>"#;
        assert_eq!(attr_value(tag, "src"), Some("a.png"));
        assert_eq!(attr_value(tag, "alt"), Some("it's"));
        assert_eq!(attr_value(tag, "width"), None);
    }
}
