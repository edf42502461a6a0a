//! Digest de-duplication and grouping.
//!
//! After filtering, the events of one recipient's digest window are reduced
//! with [`drop_superseded`] and then laid out with [`group_by_category`]:
//! configured categories first (in registry order), the catch-all last, and
//! inside each category one cluster per group in order of first appearance.

use std::collections::HashSet;

use serde::Serialize;

use crate::event::NotificationEvent;
use crate::registry::{NotificationRegistry, UNCATEGORISED_LABEL};
use crate::types::DbId;

/// Drop every event made redundant by a newer event on the same object.
///
/// For each pair on the same target, the older one goes if both share a
/// notification type or if either type is in the other's supersession list.
/// The result is sorted chronologically.
pub fn drop_superseded(
    mut events: Vec<NotificationEvent>,
    registry: &NotificationRegistry,
) -> Vec<NotificationEvent> {
    events.sort_by_key(|e| (e.occurred_at, e.id));

    let mut dropped: HashSet<DbId> = HashSet::new();
    for (i, older) in events.iter().enumerate() {
        let obsolete = events[i + 1..].iter().any(|newer| {
            newer.target == older.target
                && (newer.notification_type == older.notification_type
                    || registry.either_supersedes(&newer.notification_type, &older.notification_type))
        });
        if obsolete {
            dropped.insert(older.id);
        }
    }

    events.retain(|e| !dropped.contains(&e.id));
    events
}

/// Events of one group inside a category, chronological.
#[derive(Debug, Clone, Serialize)]
pub struct GroupCluster<T> {
    pub group_id: Option<DbId>,
    pub items: Vec<T>,
}

/// One labelled digest section.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySection<T> {
    pub label: String,
    pub clusters: Vec<GroupCluster<T>>,
}

/// Lay out chronologically sorted items into categories and group clusters.
///
/// `type_of` and `group_of` read the notification type key and the group of
/// an item. Empty categories are omitted.
pub fn group_by_category<T, FT, FG>(
    items: Vec<T>,
    registry: &NotificationRegistry,
    type_of: FT,
    group_of: FG,
) -> Vec<CategorySection<T>>
where
    FT: Fn(&T) -> &str,
    FG: Fn(&T) -> Option<DbId>,
{
    let categories = registry.categories();
    // One bucket per configured category plus the catch-all.
    let mut buckets: Vec<Vec<T>> = (0..=categories.len()).map(|_| Vec::new()).collect();

    for item in items {
        let key = type_of(&item);
        let index = categories
            .iter()
            .position(|c| c.types.contains(key))
            .unwrap_or(categories.len());
        buckets[index].push(item);
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(i, bucket)| {
            let label = categories
                .get(i)
                .map(|c| c.label.clone())
                .unwrap_or_else(|| UNCATEGORISED_LABEL.to_string());
            CategorySection {
                label,
                clusters: cluster_by_group(bucket, &group_of),
            }
        })
        .collect()
}

fn cluster_by_group<T, FG>(items: Vec<T>, group_of: &FG) -> Vec<GroupCluster<T>>
where
    FG: Fn(&T) -> Option<DbId>,
{
    let mut clusters: Vec<GroupCluster<T>> = Vec::new();
    for item in items {
        let group_id = group_of(&item);
        match clusters.iter_mut().find(|c| c.group_id == group_id) {
            Some(cluster) => cluster.items.push(item),
            None => clusters.push(GroupCluster {
                group_id,
                items: vec![item],
            }),
        }
    }
    clusters
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
