pub mod archive;
pub mod xml;

use serde::{Deserialize, Serialize};

pub use archive::open_input;
pub use xml::read_manual;

/// Root of a VLP export: the manual plus its top-level content nodes.
#[derive(Debug, Clone, Default)]
pub struct SourceManual {
    pub id: String,
    pub name: String,
    pub language: String,
    pub data_format: String,
    pub nodes: Vec<SourceNode>,
}

/// One `ContentNode` of the export tree.
#[derive(Debug, Clone, Default)]
pub struct SourceNode {
    pub id: String,
    pub title: String,
    pub order: i64,
    pub children: Vec<SourceNode>,
    pub localized: Option<LocalizedContent>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalizedContent {
    pub title: String,
    pub language: String,
    pub body: String,
    pub images: Vec<ImageRef>,
}

/// An `<img>` entry from a node's image list. Dimensions are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub filename: String,
    pub width: String,
    pub height: String,
}

impl ImageRef {
    /// Bare file name used to find the image on disk.
    pub fn basename(&self) -> &str {
        let name = if self.filename.is_empty() {
            &self.src
        } else {
            &self.filename
        };
        let name = name.split('?').next().unwrap_or(name);
        name.rsplit(['/', '\\']).next().unwrap_or(name)
    }
}

impl SourceNode {
    /// Node title, falling back to the localized title when blank.
    pub fn display_title(&self) -> &str {
        match &self.localized {
            Some(loc) if self.title.trim().is_empty() => &loc.title,
            _ => &self.title,
        }
    }

    pub fn body(&self) -> &str {
        self.localized.as_ref().map_or("", |l| l.body.as_str())
    }

    pub fn images(&self) -> &[ImageRef] {
        self.localized.as_ref().map_or(&[], |l| l.images.as_slice())
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}
