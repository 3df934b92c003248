use std::collections::HashMap;

use tracing::info;

use crate::{
    config::FilterConfig,
    model::{OutputRow, Paper},
};

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub rows: Vec<OutputRow>,
    /// Papers left after deduplication, before any filter.
    pub total: usize,
    pub relevant: usize,
}

impl Digest {
    /// `relevant / total`, or `None` when nothing was fetched.
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.relevant as f64 / self.total as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Collapses versions of the same paper. A later record overwrites an
/// earlier one with the same canonical id.
pub fn dedup_by_canonical_id(raw: Vec<Paper>) -> HashMap<String, Paper> {
    let mut latest: HashMap<String, Paper> = HashMap::with_capacity(raw.len());
    for paper in raw {
        latest.insert(paper.canonical_id().to_string(), paper);
    }
    latest
}

pub fn within_window(paper: &Paper, config: &FilterConfig) -> bool {
    let in_window = paper.timestamp(config.window_field) >= config.cutoff;
    let in_category = config
        .category
        .as_deref()
        .map_or(true, |category| paper.has_category(category));
    in_window && in_category
}

pub fn run(raw: Vec<Paper>, config: &FilterConfig) -> Digest {
    let working_set = dedup_by_canonical_id(raw);
    let total = working_set.len();

    let mut kept: Vec<Paper> = working_set
        .into_values()
        .filter(|paper| within_window(paper, config))
        .filter(|paper| !config.boring_words.matches(&paper.title))
        .collect();

    kept.sort_by(|a, b| {
        a.published
            .cmp(&b.published)
            .then_with(|| a.canonical_id().cmp(b.canonical_id()))
    });

    let rows: Vec<OutputRow> = kept.iter().map(OutputRow::from_paper).collect();
    let digest = Digest {
        relevant: rows.len(),
        rows,
        total,
    };

    match digest.ratio() {
        Some(ratio) if digest.relevant > 0 => info!(
            "{} relevant papers out of {} ({:.1}%)",
            digest.relevant,
            digest.total,
            ratio * 100.0
        ),
        _ => info!(total = digest.total, "no qualifying papers"),
    }
    digest
}
