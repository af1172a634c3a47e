use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::attr_value;

static DIV_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<div\s[^>]*>").unwrap());
static THUMB_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/vi/([^/]+)/").unwrap());

/// Replace VLP YouTube thumbnails (`mediatag-thumb youtube-thumb` divs) with
/// ScreenSteps `html-embed` iframes. Thumbnails without a usable video id
/// are left as they are.
pub fn convert_embeds(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    for open in DIV_OPEN.find_iter(html) {
        let tag = open.as_str();
        if open.start() < cursor || !is_youtube_thumb(tag) {
            continue;
        }
        let Some(id) = video_id(tag) else {
            debug!("YouTube thumbnail without a video id: {tag}");
            continue;
        };
        let Some(close) = html[open.end()..].find("</div>") else {
            continue;
        };

        out.push_str(&html[cursor..open.start()]);
        out.push_str(&embed_html(id));
        cursor = open.end() + close + "</div>".len();
        debug!("Converted YouTube embed: {id}");
    }

    out.push_str(&html[cursor..]);
    out
}

pub fn embed_html(video_id: &str) -> String {
    format!(
        "<div class=\"html-embed\"><iframe width=\"560\" height=\"315\" \
         src=\"https://www.youtube.com/embed/{video_id}\" title=\"YouTube video player\" frameborder=\"0\" \
         allow=\"accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture; web-share\" \
         referrerpolicy=\"strict-origin-when-cross-origin\" allowfullscreen></iframe></div>"
    )
}

fn is_youtube_thumb(tag: &str) -> bool {
    attr_value(tag, "class").is_some_and(|class| {
        let has = |name: &str| class.split_whitespace().any(|c| c == name);
        has("mediatag-thumb") && has("youtube-thumb")
    })
}

/// `data-media-id`, else the id segment of `data-thumb-url` (`.../vi/<id>/...`).
fn video_id(tag: &str) -> Option<&str> {
    if let Some(id) = attr_value(tag, "data-media-id").filter(|id| !id.trim().is_empty()) {
        return Some(id.trim());
    }
    let url = attr_value(tag, "data-thumb-url")?;
    THUMB_VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
