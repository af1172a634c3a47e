//! ScreenSteps content blocks built from a converted article.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::UploadedImage;
use crate::error::ApiError;
use crate::model::Article;
use crate::report::SkippedImage;
use crate::rewrite::visible_text;
use crate::segment::{tokenize, Token};

const EMBED_STYLE: &str = "html-embed";
const ALERT_STYLE: &str = "alert";
const IMAGE_ERROR_BODY: &str = "<p>ERROR IMPORTING IMAGE - PLEASE RE-CREATE SCREENSHOT</p>";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    StepContent {
        uuid: String,
        title: String,
        depth: u8,
        sort_order: usize,
        content_block_ids: Vec<String>,
        anchor_name: String,
        auto_numbered: bool,
        foldable: bool,
    },
    TextContent {
        uuid: String,
        body: String,
        depth: u8,
        sort_order: usize,
        style: Option<String>,
        show_copy_clipboard: bool,
    },
    ImageContentBlock {
        uuid: String,
        asset_file_name: String,
        image_asset_id: u64,
        width: u32,
        height: u32,
        depth: u8,
        sort_order: usize,
        alt_tag: String,
        url: String,
    },
}

impl ContentBlock {
    pub fn uuid(&self) -> &str {
        match self {
            ContentBlock::StepContent { uuid, .. }
            | ContentBlock::TextContent { uuid, .. }
            | ContentBlock::ImageContentBlock { uuid, .. } => uuid,
        }
    }

    #[cfg(test)]
    pub fn sort_order(&self) -> usize {
        match self {
            ContentBlock::StepContent { sort_order, .. }
            | ContentBlock::TextContent { sort_order, .. }
            | ContentBlock::ImageContentBlock { sort_order, .. } => *sort_order,
        }
    }
}

/// Where referenced images go. The API client implements this; tests use
/// an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait ImageSink {
    async fn upload_image(&mut self, path: &Path) -> Result<UploadedImage, ApiError>;
}

#[derive(Debug, Default)]
pub struct ArticleBlocks {
    pub blocks: Vec<ContentBlock>,
    pub images_uploaded: usize,
    pub skipped: Vec<SkippedImage>,
}

struct Builder {
    out: ArticleBlocks,
}

impl Builder {
    fn next_sort_order(&self) -> usize {
        self.out.blocks.len() + 1
    }

    fn push(&mut self, block: ContentBlock) -> String {
        let uuid = block.uuid().to_string();
        self.out.blocks.push(block);
        uuid
    }

    fn text(&mut self, body: &str, style: Option<&str>) -> String {
        self.push(ContentBlock::TextContent {
            uuid: new_uuid(),
            body: body.to_string(),
            depth: 1,
            sort_order: self.next_sort_order(),
            style: style.map(str::to_string),
            show_copy_clipboard: false,
        })
    }
}

/// Build the block list for one article, uploading referenced images from
/// `image_dir` through `sink`. Missing or failed images never abort the
/// article; they are returned in `skipped`.
pub async fn build_article_blocks<S: ImageSink>(
    article: &Article,
    chapter_title: &str,
    image_dir: &Path,
    sink: &mut S,
    image_error_placeholder: bool,
) -> ArticleBlocks {
    let mut b = Builder {
        out: ArticleBlocks::default(),
    };

    for step in &article.steps {
        let header = b.out.blocks.len();
        b.push(ContentBlock::StepContent {
            uuid: new_uuid(),
            title: step.title.clone(),
            depth: 0,
            sort_order: b.next_sort_order(),
            content_block_ids: Vec::new(),
            anchor_name: slugify(&step.title),
            auto_numbered: false,
            foldable: false,
        });

        let mut children = Vec::new();
        for token in tokenize(&step.content) {
            match token {
                Token::Text(html) => {
                    if !visible_text(html).is_empty() {
                        children.push(b.text(html, None));
                    }
                }
                Token::Embed(html) => children.push(b.text(html, Some(EMBED_STYLE))),
                Token::Styled { style, inner } => children.push(b.text(inner, Some(style))),
                Token::Image { src } => {
                    let file_name = image_file_name(src);
                    let path = image_dir.join(&file_name);
                    match upload(sink, &path).await {
                        Ok(image) => {
                            debug!("Uploaded image {} as asset {}", file_name, image.id);
                            b.out.images_uploaded += 1;
                            children.push(b.push(ContentBlock::ImageContentBlock {
                                uuid: new_uuid(),
                                asset_file_name: file_name,
                                image_asset_id: image.id,
                                width: image.width,
                                height: image.height,
                                depth: 1,
                                sort_order: b.next_sort_order(),
                                alt_tag: String::new(),
                                url: image.url,
                            }));
                        }
                        Err(reason) => {
                            warn!("Skipping image {}: {}", path.display(), reason);
                            b.out.skipped.push(SkippedImage {
                                chapter: chapter_title.to_string(),
                                article: article.title.clone(),
                                step: step.title.clone(),
                                image: path.display().to_string(),
                            });
                            if image_error_placeholder {
                                children.push(b.text(IMAGE_ERROR_BODY, Some(ALERT_STYLE)));
                            }
                        }
                    }
                }
            }
        }

        if let ContentBlock::StepContent {
            content_block_ids, ..
        } = &mut b.out.blocks[header]
        {
            *content_block_ids = children;
        }
    }

    b.out
}

#[derive(Debug, thiserror::Error)]
enum SkipReason {
    #[error("file not found")]
    Missing,
    #[error("upload failed: {0}")]
    Failed(ApiError),
}

async fn upload<S: ImageSink>(sink: &mut S, path: &Path) -> Result<UploadedImage, SkipReason> {
    if !path.is_file() {
        return Err(SkipReason::Missing);
    }
    sink.upload_image(path).await.map_err(SkipReason::Failed)
}

/// File name an `<img src>` refers to: entities decoded, query dropped,
/// directories stripped.
pub fn image_file_name(src: &str) -> String {
    let src = html_escape::decode_html_entities(src);
    let path = src.split('?').next().unwrap_or_default();
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Anchor slug: lowercase, spaces to `-`, anything else outside `[a-z0-9-]` dropped.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}
