use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::ManualDocument;
use crate::report::{RunStats, SkippedImage};

/// Write `<output>/<Manual Name>/` (TOC, per-article JSON, copied images).
/// The directory is recreated from scratch. Returns its path.
pub fn write_output(
    doc: &ManualDocument,
    output_root: &Path,
    source_images: &Path,
    stats: &mut RunStats,
) -> Result<PathBuf> {
    let manual = &doc.manual;
    let dir = output_root.join(dir_name(&manual.title, &manual.id));
    info!("Writing ScreenSteps output to {}", dir.display());

    if dir.exists() {
        fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to clear output directory {}", dir.display()))?;
    }
    let articles_dir = dir.join("articles");
    let images_dir = dir.join("images");
    for d in [&articles_dir, &images_dir] {
        fs::create_dir_all(d).with_context(|| format!("Failed to create {}", d.display()))?;
    }

    write_json(&dir.join(format!("{}.json", manual.id)), doc)?;

    let available = index_images(source_images);
    for (chapter, article) in manual.articles() {
        write_json(&articles_dir.join(format!("{}.json", article.id)), article)?;

        let article_images = images_dir.join(&article.id);
        fs::create_dir_all(&article_images)
            .with_context(|| format!("Failed to create {}", article_images.display()))?;

        for step in &article.steps {
            for image in &step.images {
                let name = image.basename();
                let Some(src) = available.get(name) else {
                    warn!(
                        "Source image not found: {} (chapter: {}, article: {}, step: {})",
                        name, chapter.title, article.title, step.title
                    );
                    stats.copy_skipped.record(SkippedImage {
                        chapter: chapter.title.clone(),
                        article: article.title.clone(),
                        step: step.title.clone(),
                        image: name.to_string(),
                    });
                    continue;
                };
                let dest = article_images.join(name);
                match fs::copy(src, &dest) {
                    Ok(_) => {
                        debug!("Copied {} -> {}", src.display(), dest.display());
                        stats.images_copied += 1;
                    }
                    Err(e) => warn!("Failed to copy {} to {}: {}", src.display(), dest.display(), e),
                }
            }
        }
    }

    info!(
        "Wrote {} article files, copied {} images",
        stats.articles, stats.images_copied
    );
    Ok(dir)
}

/// Load a previously converted manual from its output directory.
pub fn load_manual(dir: &Path) -> Result<ManualDocument> {
    let toc = find_toc(dir)?;
    info!("Loading converted manual from {}", toc.display());
    let data = fs::read_to_string(&toc).with_context(|| format!("Failed to read {}", toc.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Invalid manual JSON in {}", toc.display()))
}

/// First `*.json` directly under `dir` that is not `manifest.json`.
fn find_toc(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().is_some_and(|ext| ext == "json")
                && p.file_name().is_some_and(|n| n != "manifest.json")
        })
        .collect();
    candidates.sort();
    match candidates.into_iter().next() {
        Some(toc) => Ok(toc),
        None => bail!("No manual JSON found in {}", dir.display()),
    }
}

/// Basename -> first path found under `root`, walking in name order.
fn index_images(root: &Path) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        index.entry(name).or_insert_with(|| entry.path().to_path_buf());
    }
    index
}

/// Output directory name: the title, else the id, else `manual`. Names made
/// only of dots would resolve outside the output root and are rejected.
fn dir_name(title: &str, id: &str) -> String {
    [title, id]
        .into_iter()
        .map(|s| s.trim().replace(['/', '\\'], "-"))
        .find(|name| !name.is_empty() && !name.chars().all(|c| c == '.'))
        .unwrap_or_else(|| "manual".to_string())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Article, Chapter, FlatManual, ImageRef, Step};

    fn doc(images: Vec<ImageRef>) -> ManualDocument {
        ManualDocument {
            manual: FlatManual {
                id: "m-1".into(),
                title: "HOL/2601 Lab".into(),
                language: "en".into(),
                created_at: "t0".into(),
                updated_at: "t0".into(),
                chapters: vec![Chapter {
                    id: "c-1".into(),
                    title: "Chapter".into(),
                    order: 1,
                    description: String::new(),
                    articles: vec![Article {
                        id: "a-1".into(),
                        title: "Article".into(),
                        position: 1,
                        vlp_order: 3,
                        steps: vec![Step {
                            id: "s-1".into(),
                            title: "Step".into(),
                            order: 1,
                            content: "<p>a < b & <strong>c</strong></p>".into(),
                            images,
                        }],
                    }],
                }],
            },
        }
    }

    fn image(filename: &str) -> ImageRef {
        ImageRef {
            src: format!("./images/{filename}"),
            filename: format!("images/{filename}"),
            width: "640".into(),
            height: "480".into(),
        }
    }

    fn source_images() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("deep/er")).unwrap();
        fs::write(dir.path().join("deep/er/shot.png"), b"png").unwrap();
        dir
    }

    #[test]
    fn writes_toc_articles_and_images() {
        let src = source_images();
        let out = tempfile::tempdir().unwrap();
        let mut stats = RunStats::default();

        let dir = write_output(
            &doc(vec![image("shot.png"), image("gone.png")]),
            out.path(),
            src.path(),
            &mut stats,
        )
        .unwrap();

        assert_eq!(dir, out.path().join("HOL-2601 Lab"));
        let toc = fs::read_to_string(dir.join("m-1.json")).unwrap();
        assert!(toc.starts_with("{\n  \"manual\": {"));
        assert!(toc.ends_with("}\n"));
        assert!(toc.contains("a < b & <strong>c</strong>"));

        let article: Article =
            serde_json::from_str(&fs::read_to_string(dir.join("articles/a-1.json")).unwrap()).unwrap();
        assert_eq!(article.vlp_order, 3);

        assert!(dir.join("images/a-1/shot.png").is_file());
        assert_eq!(stats.images_copied, 1);
        assert_eq!(stats.copy_skipped.len(), 1);
        let skipped = stats.copy_skipped.iter().next().unwrap();
        assert_eq!(skipped.image, "gone.png");
        assert_eq!(skipped.step, "Step");
    }

    #[test]
    fn rerun_is_byte_identical_and_fresh() {
        let src = source_images();
        let out = tempfile::tempdir().unwrap();
        let d = doc(vec![image("shot.png")]);

        let dir = write_output(&d, out.path(), src.path(), &mut RunStats::default()).unwrap();
        let first = fs::read(dir.join("m-1.json")).unwrap();
        fs::write(dir.join("articles/stale.json"), "{}").unwrap();

        write_output(&d, out.path(), src.path(), &mut RunStats::default()).unwrap();
        assert_eq!(fs::read(dir.join("m-1.json")).unwrap(), first);
        assert!(!dir.join("articles/stale.json").exists());
    }

    #[test]
    fn load_manual_reads_back_toc() {
        let src = source_images();
        let out = tempfile::tempdir().unwrap();
        let d = doc(vec![]);
        let dir = write_output(&d, out.path(), src.path(), &mut RunStats::default()).unwrap();
        fs::write(dir.join("manifest.json"), "{}").unwrap();

        assert_eq!(load_manual(&dir).unwrap(), d);
    }

    #[test]
    fn load_manual_without_toc_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        assert!(load_manual(dir.path()).is_err());
    }

    #[test]
    fn dot_title_stays_inside_output_root() {
        let src = source_images();
        let parent = tempfile::tempdir().unwrap();
        let out = parent.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(parent.path().join("keep.txt"), "x").unwrap();

        let mut d = doc(vec![]);
        d.manual.title = "..".into();
        let dir = write_output(&d, &out, src.path(), &mut RunStats::default()).unwrap();

        assert_eq!(dir, out.join("m-1"));
        assert!(parent.path().join("keep.txt").is_file());
        assert!(dir.join("m-1.json").is_file());
    }

    #[test]
    fn blank_title_falls_back_to_id() {
        assert_eq!(dir_name("  ", "m-9"), "m-9");
        assert_eq!(dir_name("a\\b/c", "x"), "a-b-c");
        assert_eq!(dir_name("..", "m-9"), "m-9");
        assert_eq!(dir_name(" . ", "m-9"), "m-9");
        assert_eq!(dir_name("...", ".."), "manual");
        assert_eq!(dir_name("v1.2", "x"), "v1.2");
    }
}
