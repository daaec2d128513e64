//! Denormalized search projections of communities.
//!
//! The index is refreshed on a spawned task after the data commit, so reads
//! may briefly trail writes. Each document embeds a field-limited copy of its
//! parent plus a `{parent_id}::{parent_revision}` tag; after a parent
//! changes, a sweep re-projects children whose embedded tag went stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::policy::SearchFilter;
use crate::store::Store;
use crate::types::{Community, CommunityStatus, Visibility};

/// Field-limited copy of a parent community embedded in child documents.
#[derive(Debug, Clone, Serialize)]
pub struct ParentDocument {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub kind: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunityDocument {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub kind: String,
    pub visibility: Visibility,
    pub status: CommunityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentDocument>,
    /// `{parent_id}::{parent_revision}` at projection time; compared against
    /// the parent's current tag to find stale copies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

/// Monotonic tag identifying one revision of a community.
#[must_use]
pub fn version_tag(community: &Community) -> String {
    format!("{}::{}", community.id, community.revision)
}

impl CommunityDocument {
    #[must_use]
    pub fn project(community: &Community, parent: Option<&Community>) -> Self {
        Self {
            id: community.id.clone(),
            slug: community.slug.clone(),
            title: community.title.clone(),
            kind: community.kind.clone(),
            visibility: community.visibility,
            status: community.status,
            parent: parent.map(|p| ParentDocument {
                id: p.id.clone(),
                slug: p.slug.clone(),
                title: p.title.clone(),
                kind: p.kind.clone(),
                visibility: p.visibility,
            }),
            parent_version: parent.map(version_tag),
            revision: community.revision,
            updated_at: community.updated_at,
        }
    }
}

/// Search parameters on top of the policy filter.
#[derive(Debug, Default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub status: Option<CommunityStatus>,
    pub kind: Option<String>,
    pub parent: Option<String>,
}

#[derive(Default)]
pub struct CommunityIndex {
    docs: Mutex<HashMap<String, CommunityDocument>>,
}

impl CommunityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> std::sync::MutexGuard<'_, HashMap<String, CommunityDocument>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn upsert(&self, doc: CommunityDocument) {
        self.docs().insert(doc.id.clone(), doc);
    }

    pub fn remove(&self, id: &str) {
        self.docs().remove(id);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<CommunityDocument> {
        self.docs().get(id).cloned()
    }

    /// Returns matching documents ordered by slug.
    #[must_use]
    pub fn query(&self, filter: &SearchFilter, params: &SearchParams) -> Vec<CommunityDocument> {
        let needle = params.q.as_deref().map(str::to_lowercase);
        let mut results: Vec<CommunityDocument> = self
            .docs()
            .values()
            .filter(|doc| filter.matches(&doc.id, doc.visibility))
            .filter(|doc| {
                needle.as_deref().is_none_or(|q| {
                    doc.slug.to_lowercase().contains(q) || doc.title.to_lowercase().contains(q)
                })
            })
            .filter(|doc| params.status.is_none_or(|s| doc.status == s))
            .filter(|doc| params.kind.as_deref().is_none_or(|k| doc.kind == k))
            .filter(|doc| {
                params
                    .parent
                    .as_deref()
                    .is_none_or(|p| doc.parent.as_ref().is_some_and(|d| d.id == p))
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| a.slug.cmp(&b.slug));
        results
    }

    /// Ids of child documents whose embedded parent copy lags the given
    /// parent revision.
    #[must_use]
    pub fn stale_children(&self, parent: &Community) -> Vec<String> {
        let current = version_tag(parent);
        self.docs()
            .values()
            .filter(|doc| {
                doc.parent.as_ref().is_some_and(|p| p.id == parent.id)
                    && doc.parent_version.as_deref() != Some(current.as_str())
            })
            .map(|doc| doc.id.clone())
            .collect()
    }
}

/// Re-projects one community (and any children holding a stale parent copy).
/// Used both inline at startup and from the post-commit refresh task.
pub fn refresh(store: &dyn Store, index: &CommunityIndex, community_id: &str) -> Result<()> {
    let Some(community) = store.get_community(community_id)? else {
        index.remove(community_id);
        return Ok(());
    };

    let parent = match &community.parent_id {
        Some(parent_id) => store.get_community(parent_id)?,
        None => None,
    };
    index.upsert(CommunityDocument::project(&community, parent.as_ref()));

    for child_id in index.stale_children(&community) {
        if let Some(child) = store.get_community(&child_id)? {
            index.upsert(CommunityDocument::project(&child, Some(&community)));
        }
    }

    Ok(())
}

/// Schedules a refresh after the surrounding transaction has committed.
/// Consumers tolerate brief read-after-write staleness.
pub fn schedule_refresh(
    store: Arc<dyn Store>,
    index: Arc<CommunityIndex>,
    community_id: String,
) {
    tokio::spawn(async move {
        if let Err(e) = refresh(store.as_ref(), index.as_ref(), &community_id) {
            tracing::warn!("index refresh failed for {community_id}: {e}");
        }
    });
}

/// Projects every live community, e.g. at server start.
pub fn rebuild(store: &dyn Store, index: &CommunityIndex) -> Result<usize> {
    let mut cursor = String::new();
    let mut count = 0;
    loop {
        let batch = store.list_communities(&cursor, 200)?;
        let Some(last) = batch.last() else { break };
        cursor = last.slug.clone();
        for community in &batch {
            let parent = match &community.parent_id {
                Some(parent_id) => store.get_community(parent_id)?,
                None => None,
            };
            index.upsert(CommunityDocument::project(community, parent.as_ref()));
            count += 1;
        }
    }
    Ok(count)
}
