use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::api::{NewChapter, ScreenStepsClient, SiteImages};
use crate::blocks::build_article_blocks;
use crate::config::UploadSettings;
use crate::model::{Chapter, ManualDocument};
use crate::report::UploadReport;

/// Push a converted manual to ScreenSteps: manual and chapters first, then
/// for each article its placeholder, images and content blocks. Article
/// level failures are recorded in the report and do not stop the run.
pub async fn upload_manual(
    client: &ScreenStepsClient,
    doc: &ManualDocument,
    content_dir: &Path,
    site_id: &str,
    existing_manual: Option<u64>,
    settings: &UploadSettings,
) -> Result<UploadReport> {
    let manual = &doc.manual;
    let mut report = UploadReport {
        manual_title: format!("{}{}", manual.title, settings.title_suffix),
        ..Default::default()
    };

    if settings.verify_site {
        let sites = client.list_sites().await.context("Failed to list sites")?;
        if !sites.iter().any(|id| id.to_string() == site_id) {
            bail!("Site {site_id} not found for these credentials (available: {sites:?})");
        }
        info!("Verified site {site_id}");
    }

    let (manual_id, chapter_ids) = match existing_manual {
        Some(id) => {
            info!("Adding chapters to existing manual {id}");
            let ids = create_chapters(client, site_id, id, &manual.chapters, &mut report).await?;
            (id, ids)
        }
        None => {
            let requested: Vec<NewChapter> = manual
                .chapters
                .iter()
                .map(|c| NewChapter {
                    title: c.title.clone(),
                    position: c.order,
                })
                .collect();
            let created = client
                .create_manual(site_id, &report.manual_title, &requested, settings.publish_manual)
                .await
                .context("Failed to create manual")?;
            info!("Created manual {} (id {})", report.manual_title, created.id);

            let mut ids: Vec<u64> = created.chapters.iter().map(|c| c.id).collect();
            ids.truncate(manual.chapters.len());
            report.chapters_created += ids.len();
            if ids.len() < manual.chapters.len() {
                warn!(
                    "Manual response had {} of {} chapters; creating the rest individually",
                    ids.len(),
                    manual.chapters.len()
                );
                let rest = &manual.chapters[ids.len()..];
                ids.extend(create_chapters(client, site_id, created.id, rest, &mut report).await?);
            }
            (created.id, ids)
        }
    };
    report.manual_id = Some(manual_id);

    let total: usize = manual.chapters.iter().map(|c| c.articles.len()).sum();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut images = SiteImages { client, site_id };
    for (chapter, chapter_id) in manual.chapters.iter().zip(chapter_ids) {
        for article in &chapter.articles {
            pb.set_message(article.title.clone());

            let article_id = match client
                .create_article(site_id, chapter_id, &article.title, article.position)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!("Failed to create article {}: {}", article.title, e);
                    report.articles_failed.push(article.title.clone());
                    pb.inc(1);
                    continue;
                }
            };
            report.articles_created += 1;

            let image_dir = content_dir.join("images").join(&article.id);
            let built = build_article_blocks(
                article,
                &chapter.title,
                &image_dir,
                &mut images,
                settings.image_error_placeholder,
            )
            .await;
            report.images_uploaded += built.images_uploaded;
            for skip in built.skipped {
                report.skipped.record(skip);
            }

            if let Err(e) = client
                .update_article_contents(
                    site_id,
                    article_id,
                    &article.title,
                    &built.blocks,
                    settings.publish_articles,
                )
                .await
            {
                warn!("Failed to update contents of {}: {}", article.title, e);
                report.content_failed.push(article.title.clone());
            }
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    info!(
        "Upload finished: {} articles, {} images, {} skipped",
        report.articles_created,
        report.images_uploaded,
        report.skipped.len()
    );
    Ok(report)
}

async fn create_chapters(
    client: &ScreenStepsClient,
    site_id: &str,
    manual_id: u64,
    chapters: &[Chapter],
    report: &mut UploadReport,
) -> Result<Vec<u64>> {
    let mut ids = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let id = client
            .create_chapter(site_id, manual_id, &chapter.title, chapter.order)
            .await
            .with_context(|| format!("Failed to create chapter {}", chapter.title))?;
        info!("Created chapter {} (id {id})", chapter.title);
        report.chapters_created += 1;
        ids.push(id);
    }
    Ok(ids)
}
