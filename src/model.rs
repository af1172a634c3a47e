//! Flattened ScreenSteps model written to `<manual-id>.json` and
//! `articles/<article-id>.json`.

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

pub use crate::source::ImageRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualDocument {
    pub manual: FlatManual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatManual {
    pub id: String,
    pub title: String,
    pub language: String,
    pub created_at: String,
    pub updated_at: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub order: i64,
    pub description: String,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    /// 1-based, contiguous within the chapter.
    pub position: usize,
    /// `orderIndex` from the export, kept for debugging only.
    pub vlp_order: i64,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub order: i64,
    pub content: String,
    pub images: Vec<ImageRef>,
}

impl FlatManual {
    pub fn articles(&self) -> impl Iterator<Item = (&Chapter, &Article)> {
        self.chapters
            .iter()
            .flat_map(|c| c.articles.iter().map(move |a| (c, a)))
    }
}

/// RFC 3339 local time, whole seconds.
pub fn timestamp_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}
