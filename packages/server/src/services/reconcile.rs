use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::ResourceError;
use super::reference::extract_references;
use super::resource::ResourceStore;

/// References a content edit adds and removes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ReferenceDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl ReferenceDiff {
    pub fn between(old_content: &str, new_content: &str) -> Self {
        let old_refs = extract_references(old_content);
        let new_refs = extract_references(new_content);
        Self {
            added: new_refs.difference(&old_refs).cloned().collect(),
            removed: old_refs.difference(&new_refs).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Keeps resource reference sets in step with memory content edits.
///
/// Each per-path step is idempotent, so a call that failed half way can be
/// retried with the same contents and converges. Steps already applied are
/// not rolled back.
#[derive(Clone)]
pub struct ReferenceReconciler {
    store: ResourceStore,
}

impl ReferenceReconciler {
    pub fn new(store: ResourceStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self, old_content, new_content))]
    pub async fn reconcile(
        &self,
        owner_id: i32,
        old_content: &str,
        new_content: &str,
        memory_id: Uuid,
    ) -> Result<ReferenceDiff, ResourceError> {
        let diff = ReferenceDiff::between(old_content, new_content);
        if diff.is_empty() {
            return Ok(diff);
        }

        for path in &diff.added {
            self.store
                .upsert_reference(owner_id, path, memory_id)
                .await?;
        }
        for path in &diff.removed {
            self.store
                .remove_reference(owner_id, path, memory_id)
                .await?;
        }

        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Reconciled memory references"
        );
        Ok(diff)
    }
}
