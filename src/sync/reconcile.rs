use std::collections::HashMap;

use crate::feed::NewsItem;
use crate::storage::KnownIds;

/// Summaries whose external id is not yet stored, keyed by that id.
///
/// Repeated ids within one feed page collapse to the last occurrence.
pub fn new_summaries(known: &KnownIds, items: Vec<NewsItem>) -> HashMap<i64, NewsItem> {
    let mut fresh = HashMap::with_capacity(items.len());
    for item in items {
        if !known.contains(&item.id) {
            fresh.insert(item.id, item);
        }
    }
    fresh
}
