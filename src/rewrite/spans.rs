use std::sync::LazyLock;

use regex::Regex;

use crate::config::{InlineTag, RewriteSettings};

static CLASSED_SPAN_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span\s+class="([^"]+)"[^>]*>"#).unwrap());
static EMPTY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<span[^>]*>\s*</span>").unwrap());

const SPAN_CLOSE: &str = "</span>";

/// Class-to-tag rules for inline `<span class="...">` formatting.
pub struct SpanRules {
    bold_class: String,
    table: Vec<(String, InlineTag)>,
}

impl SpanRules {
    pub fn from_settings(settings: &RewriteSettings) -> Self {
        Self {
            bold_class: settings.bold_class.clone(),
            table: settings
                .span_tags
                .iter()
                .map(|rule| (rule.class.clone(), rule.tag))
                .collect(),
        }
    }

    /// Tag for a span's class list. Any bold class makes the span bold;
    /// otherwise the first table entry present decides. `None` means the
    /// span is unwrapped.
    pub fn tag_for(&self, class_attr: &str) -> Option<InlineTag> {
        let classes: Vec<&str> = class_attr.split_whitespace().collect();
        let present = |class: &str| classes.contains(&class);
        if present(&self.bold_class)
            || self
                .table
                .iter()
                .any(|(class, tag)| *tag == InlineTag::Strong && present(class))
        {
            return Some(InlineTag::Strong);
        }
        self.table
            .iter()
            .find(|(class, _)| present(class))
            .map(|(_, tag)| *tag)
    }

    pub fn rewrite(&self, html: &str) -> String {
        let replaced = self.replace_spans(html);
        EMPTY_SPAN.replace_all(&replaced, "").into_owned()
    }

    /// Replace each classed span with its closing tag found by depth, so
    /// nested spans keep their own content.
    fn replace_spans(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut cursor = 0;
        while let Some(caps) = CLASSED_SPAN_OPEN.captures_at(html, cursor) {
            let Some(open) = caps.get(0) else { break };
            let Some((inner_end, close_end)) = matching_close(html, open.end()) else {
                // unclosed: keep the tag as is
                out.push_str(&html[cursor..open.end()]);
                cursor = open.end();
                continue;
            };
            out.push_str(&html[cursor..open.start()]);
            let inner = self.replace_spans(&html[open.end()..inner_end]);
            match self.tag_for(&caps[1]) {
                Some(tag) => out.push_str(&format!("<{0}>{inner}</{0}>", tag.name())),
                None => out.push_str(&inner),
            }
            cursor = close_end;
        }
        out.push_str(&html[cursor..]);
        out
    }
}

/// Start and end of the `</span>` closing a span whose opening tag ends at
/// `from`, counting nested spans.
fn matching_close(html: &str, from: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = from;
    loop {
        let rest = &html[pos..];
        let close = rest.find(SPAN_CLOSE)?;
        match rest[..close].find("<span") {
            Some(open) => {
                let after = rest[open + "<span".len()..].chars().next();
                if after.is_some_and(|c| c.is_whitespace() || c == '>') {
                    depth += 1;
                }
                pos += open + "<span".len();
            }
            None => {
                depth -= 1;
                let close_start = pos + close;
                let close_end = close_start + SPAN_CLOSE.len();
                if depth == 0 {
                    return Some((close_start, close_end));
                }
                pos = close_end;
            }
        }
    }
}
