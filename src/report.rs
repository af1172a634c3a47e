//! Run statistics passed through the pipeline, and the end-of-run summaries.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub chapter: String,
    pub article: String,
    pub step: String,
    pub image: String,
}

/// Skipped images, deduplicated, in the order first seen.
#[derive(Debug, Default)]
pub struct SkipList {
    entries: Vec<SkippedImage>,
}

impl SkipList {
    /// Returns `false` if the same image was already recorded for this step.
    pub fn record(&mut self, entry: SkippedImage) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkippedImage> {
        self.entries.iter()
    }

    /// Indented chapter -> article -> step -> image listing.
    pub fn lines(&self) -> Vec<String> {
        type Steps<'a> = Vec<(&'a str, Vec<&'a str>)>;
        type Articles<'a> = Vec<(&'a str, Steps<'a>)>;

        let mut chapters: Vec<(&str, Articles)> = Vec::new();
        for e in self.iter() {
            let articles = slot(&mut chapters, &e.chapter);
            let steps = slot(articles, &e.article);
            slot(steps, &e.step).push(e.image.as_str());
        }

        let mut out = Vec::new();
        for (chapter, articles) in &chapters {
            out.push(format!("Chapter: {chapter}"));
            for (article, steps) in articles {
                out.push(format!("  Article: {article}"));
                for (step, images) in steps {
                    out.push(format!("    Step: {step}"));
                    for image in images {
                        out.push(format!("      - {image}"));
                    }
                }
            }
        }
        out
    }

    pub fn print(&self, heading: &str) {
        if self.is_empty() {
            return;
        }
        println!("\n{heading} ({}):", self.len());
        for line in self.lines() {
            println!("  {line}");
        }
    }
}

fn slot<'a, 'v, T: Default>(groups: &'v mut Vec<(&'a str, T)>, key: &'a str) -> &'v mut T {
    let idx = match groups.iter().position(|(k, _)| *k == key) {
        Some(idx) => idx,
        None => {
            groups.push((key, T::default()));
            groups.len() - 1
        }
    };
    &mut groups[idx].1
}

/// Totals for one conversion run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub chapters: usize,
    pub articles: usize,
    pub steps: usize,
    pub images: usize,
    pub images_copied: usize,
    pub copy_skipped: SkipList,
}

impl RunStats {
    pub fn print(&self) {
        println!(
            "Converted {} chapters, {} articles, {} steps, {} image references.",
            self.chapters, self.articles, self.steps, self.images
        );
        if self.images_copied > 0 || !self.copy_skipped.is_empty() {
            println!(
                "Copied {} images ({} missing).",
                self.images_copied,
                self.copy_skipped.len()
            );
        }
        self.copy_skipped.print("Images missing from the export");
    }
}

/// Outcome of one upload run.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub manual_id: Option<u64>,
    pub manual_title: String,
    pub chapters_created: usize,
    pub articles_created: usize,
    /// Articles that could not be created at all.
    pub articles_failed: Vec<String>,
    /// Articles created but whose content update failed.
    pub content_failed: Vec<String>,
    pub images_uploaded: usize,
    pub skipped: SkipList,
}

impl UploadReport {
    pub fn print(&self) {
        match self.manual_id {
            Some(id) => println!("Manual: {} (id {id})", self.manual_title),
            None => println!("Manual: {} (not created)", self.manual_title),
        }
        println!(
            "Created {} chapters, {} articles; uploaded {} images.",
            self.chapters_created, self.articles_created, self.images_uploaded
        );
        for (heading, titles) in [
            ("Articles not created", &self.articles_failed),
            ("Articles with failed content update", &self.content_failed),
        ] {
            if !titles.is_empty() {
                println!("\n{heading} ({}):", titles.len());
                for title in titles {
                    println!("  - {title}");
                }
            }
        }
        self.skipped
            .print("Images skipped (re-create these manually)");
    }
}
