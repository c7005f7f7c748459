//! Result reduction: dedup, grouping, ranking, capping
//!
//! Raw fan-out hits collapse in three steps: per-event dedup keeping the
//! best-scoring hit, grouping by trimmed title with occurrence dates merged,
//! and ranking by best score with bounded output sizes. Reduction is pure
//! and total; nothing in here reaches an external service.

use crate::{GroupedEvent, SearchHit};
use std::collections::{HashMap, HashSet};

/// Keep the best-scoring hit per event identifier, preserving first-seen
/// order for downstream grouping
pub fn dedupe(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut deduped: Vec<SearchHit> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        match index_by_id.get(&hit.event_id) {
            Some(&i) => {
                if hit.score > deduped[i].score {
                    deduped[i] = hit;
                }
            }
            None => {
                index_by_id.insert(hit.event_id.clone(), deduped.len());
                deduped.push(hit);
            }
        }
    }

    deduped
}

/// Group hits by trimmed title, merging distinct occurrence `(date, time)`
/// pairs sorted ascending by date. Pairs with an empty date or time are not
/// collected, and a group left without any pair is dropped.
pub fn group(hits: &[SearchHit]) -> Vec<GroupedEvent> {
    let mut groups: Vec<(String, Vec<&SearchHit>)> = Vec::new();
    let mut index_by_title: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        let title = hit.title.trim().to_string();
        match index_by_title.get(&title) {
            Some(&i) => groups[i].1.push(hit),
            None => {
                index_by_title.insert(title.clone(), groups.len());
                groups.push((title, vec![hit]));
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|(title, members)| {
            let mut seen: HashSet<(String, String)> = HashSet::new();
            let mut pairs: Vec<(String, String)> = Vec::new();

            for member in &members {
                if member.date.is_empty() || member.time.is_empty() {
                    continue;
                }
                let pair = (member.date.clone(), member.time.clone());
                if seen.insert(pair.clone()) {
                    pairs.push(pair);
                }
            }

            if pairs.is_empty() {
                return None;
            }

            // ISO dates sort chronologically as strings
            pairs.sort_by(|a, b| a.0.cmp(&b.0));

            let best_score = members
                .iter()
                .map(|m| m.score)
                .fold(f32::NEG_INFINITY, f32::max);
            let representative = members[0];

            Some(GroupedEvent {
                title,
                dates: pairs.iter().map(|(date, _)| date.clone()).collect(),
                times: pairs.iter().map(|(_, time)| time.clone()).collect(),
                best_score,
                description: representative.description.clone(),
                venue: representative.venue.clone(),
                city: representative.city.clone(),
                discipline: representative.discipline.clone(),
                price: representative.price.clone(),
                url: representative.url.clone(),
                image_url: representative.image_url.clone(),
                event_id: representative.event_id.clone(),
                date_epoch: representative.date_epoch,
            })
        })
        .collect()
}

/// Sort groups by best score descending (stable on ties) and cap the list
pub fn rank(mut events: Vec<GroupedEvent>, cap: usize) -> Vec<GroupedEvent> {
    events.sort_by(|a, b| {
        b.best_score
            .partial_cmp(&a.best_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    events.truncate(cap);
    events
}

/// Full reduction: dedup, group, rank, cap
pub fn reduce(hits: Vec<SearchHit>, max_results: usize) -> Vec<GroupedEvent> {
    rank(group(&dedupe(hits)), max_results)
}
