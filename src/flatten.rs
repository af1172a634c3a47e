use tracing::{debug, info};

use crate::model::{Article, Chapter, FlatManual, Step};
use crate::report::RunStats;
use crate::rewrite::Rewriter;
use crate::source::{SourceManual, SourceNode};

/// Walk manual -> chapter -> article -> step and build the flat model.
/// Timestamps are passed in so output stays reproducible.
pub fn flatten(
    manual: &SourceManual,
    rewriter: &Rewriter,
    timestamp: &str,
    stats: &mut RunStats,
) -> FlatManual {
    let chapters = manual
        .nodes
        .iter()
        .enumerate()
        // the first node is the manual's own title page when it has no children
        .filter(|(idx, node)| !(*idx == 0 && !node.has_children()))
        .map(|(_, node)| chapter(node, rewriter, stats))
        .collect::<Vec<_>>();

    stats.chapters += chapters.len();
    info!(
        "Flattened {} chapters, {} articles, {} steps",
        stats.chapters, stats.articles, stats.steps
    );

    FlatManual {
        id: manual.id.clone(),
        title: manual.name.clone(),
        language: manual.language.clone(),
        created_at: timestamp.to_string(),
        updated_at: timestamp.to_string(),
        chapters,
    }
}

fn chapter(node: &SourceNode, rewriter: &Rewriter, stats: &mut RunStats) -> Chapter {
    let articles = node
        .children
        .iter()
        .enumerate()
        .map(|(idx, child)| article(child, idx + 1, rewriter, stats))
        .collect();

    Chapter {
        id: node.id.clone(),
        title: node.display_title().to_string(),
        order: node.order,
        description: rewriter.clean(node.body()),
        articles,
    }
}

fn article(node: &SourceNode, position: usize, rewriter: &Rewriter, stats: &mut RunStats) -> Article {
    debug!("Processing article: {}", node.display_title());

    let steps: Vec<Step> = if node.has_children() {
        node.children
            .iter()
            .inspect(|child| {
                if child.has_children() {
                    debug!("Ignoring nodes below step {}", child.id);
                }
            })
            .map(|child| step(child, child.order, rewriter))
            .collect()
    } else {
        // no step nodes: the article body becomes its single step
        vec![step(node, 0, rewriter)]
    };

    stats.articles += 1;
    stats.steps += steps.len();
    stats.images += steps.iter().map(|s| s.images.len()).sum::<usize>();

    Article {
        id: node.id.clone(),
        title: node.display_title().to_string(),
        position,
        vlp_order: node.order,
        steps,
    }
}

fn step(node: &SourceNode, order: i64, rewriter: &Rewriter) -> Step {
    Step {
        id: node.id.clone(),
        title: node.display_title().to_string(),
        order,
        content: rewriter.clean(node.body()),
        images: node.images().to_vec(),
    }
}
