//! One check cycle per source, over already-fetched input.
//!
//! Nothing here touches the network or the disk. The poller fetches, calls
//! into this module, hands the payloads over for delivery and only then
//! records the accepted records in the stores.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::article::{self, ArticleRecord};
use crate::config::{ArticleSettings, ThreadSettings};
use crate::notify::{build_article_payload, build_thread_payload, Payload};
use crate::storage::{ArticleStore, ThreadStore};
use crate::thread::{summarize_comments, Rejected, TagFilter, ThreadCandidate, ThreadRecord};

/// A record that passed the novelty check, with the payload built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted<R> {
    pub record: R,
    pub payload: Payload,
}

pub fn check_articles(
    html: &str,
    store: &ArticleStore,
    settings: &ArticleSettings,
) -> Option<Accepted<ArticleRecord>> {
    let record = article::extract(html, store.last_url(), settings)?;
    info!(url = %record.url, title = %record.title, "new patch notes");
    let payload = build_article_payload(&record);
    Some(Accepted { record, payload })
}

pub fn remember_article(store: &mut ArticleStore, record: &ArticleRecord) {
    store.accept(record.url.clone());
}

/// Parses the candidates that are not in the store yet, in the order given.
///
/// Rejected candidates are logged and skipped; they are never recorded, so a
/// thread whose body is still being filled in gets another chance next cycle.
pub fn select_new_threads(
    candidates: &[ThreadCandidate],
    store: &ThreadStore,
    settings: &ThreadSettings,
) -> Vec<ThreadRecord> {
    let filter = TagFilter::from_settings(settings);
    let mut in_batch = HashSet::new();
    let mut records = Vec::new();

    for candidate in candidates.iter().take(settings.batch_limit) {
        if store.contains(&candidate.id) || !in_batch.insert(candidate.id.as_str()) {
            continue;
        }
        match candidate.parse(&filter, &settings.layout) {
            Ok(record) => records.push(record),
            Err(Rejected::Filtered { event }) => {
                debug!(id = %candidate.id, %event, "thread filtered out by tags");
            }
            Err(Rejected::Malformed(e)) => {
                warn!(id = %candidate.id, title = %candidate.title, error = %e, "skipping unparseable thread");
            }
        }
    }

    records
}

/// Attaches the summarized top replies and builds the payload.
pub fn complete_thread<S: AsRef<str>>(
    mut record: ThreadRecord,
    raw_comments: &[S],
    comment_limit: usize,
) -> Accepted<ThreadRecord> {
    let summary = summarize_comments(raw_comments, comment_limit);
    let payload = build_thread_payload(&record, &summary);
    record.top_comments = summary.into_bullets();
    Accepted { record, payload }
}

/// Full thread check for candidates that already carry their replies.
pub fn check_threads(
    candidates: &[ThreadCandidate],
    store: &ThreadStore,
    settings: &ThreadSettings,
) -> Vec<Accepted<ThreadRecord>> {
    let comments_by_id: std::collections::HashMap<&str, &[String]> = candidates
        .iter()
        .map(|c| (c.id.as_str(), c.comments.as_slice()))
        .collect();

    select_new_threads(candidates, store, settings)
        .into_iter()
        .map(|record| {
            let comments = comments_by_id.get(record.id.as_str()).copied().unwrap_or_default();
            complete_thread(record, comments, settings.comment_limit)
        })
        .collect()
}

pub fn remember_threads(store: &mut ThreadStore, records: &[ThreadRecord]) {
    for record in records {
        let metadata = serde_json::to_value(record).unwrap_or_default();
        let evicted = store.insert(record.id.clone(), metadata);
        if !evicted.is_empty() {
            debug!(?evicted, "evicted oldest thread ids");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, body: &str) -> ThreadCandidate {
        ThreadCandidate {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            permalink: format!("https://reddit.test/{id}"),
            comments: vec!["gg https://clips.tv/x".into()],
        }
    }

    const BODY: &str = "A) 2-0 (B\n\n[VLR](https://vlr.gg/1)\n\n\n\n\nMap 1\n---";

    #[test]
    fn duplicate_ids_in_one_batch_are_emitted_once() {
        let batch = vec![
            candidate("a", "A vs B / Masters", BODY),
            candidate("a", "A vs B / Masters", BODY),
        ];
        let out = check_threads(&batch, &ThreadStore::in_memory(), &ThreadSettings::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record.top_comments, vec!["• gg "]);
    }

    #[test]
    fn batch_limit_caps_candidates() {
        let settings = ThreadSettings {
            batch_limit: 1,
            ..ThreadSettings::default()
        };
        let batch = vec![
            candidate("a", "A vs B / Masters", BODY),
            candidate("b", "A vs B / Masters", BODY),
        ];
        let out = select_new_threads(&batch, &ThreadStore::in_memory(), &settings);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn remembered_threads_are_not_selected_again() {
        let settings = ThreadSettings::default();
        let batch = vec![candidate("a", "A vs B / Masters", BODY)];
        let mut store = ThreadStore::in_memory();

        let first = select_new_threads(&batch, &store, &settings);
        remember_threads(&mut store, &first);

        assert!(select_new_threads(&batch, &store, &settings).is_empty());
        assert_eq!(store.metadata("a").and_then(|m| m["event"].as_str()), Some("Masters"));
    }
}
