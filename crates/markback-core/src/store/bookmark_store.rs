use std::collections::HashSet;
use std::sync::Arc;

use crate::constants::{
    CONTENT_PREFIX, DEFAULT_CONVERSATION_TITLE, LOCAL_CONTENT_MAX_CHARS, SYNC_KEY,
};
use crate::error::{BookmarkError, Result};
use crate::models::{
    decode_list, now_millis, sort_newest_first, BookmarkCandidate, BookmarkEntry, BookmarkPatch,
    ContentBlob,
};
use crate::page::build_conversation_url;
use crate::storage::{StorageAreas, StoreChange, Subscription};
use crate::title::{derive_title, truncate_chars};

/// Local-store key of the overflow blob for bookmark `id`.
pub fn content_key(id: &str) -> String {
    format!("{}{}", CONTENT_PREFIX, id)
}

/// Bookmark list in the replicated area plus overflow content in the local
/// area.
///
/// The blob is always written before the list entry that references it, and
/// deleted again if the list write fails, so a failed add never leaves an
/// orphan behind. Cloning shares the underlying stores.
#[derive(Clone)]
pub struct BookmarkStore {
    areas: StorageAreas,
}

impl BookmarkStore {
    pub fn new(areas: StorageAreas) -> Self {
        Self { areas }
    }

    pub fn areas(&self) -> &StorageAreas {
        &self.areas
    }

    /// All bookmarks, newest first. Read failures yield an empty list.
    pub async fn list(&self) -> Vec<BookmarkEntry> {
        match self.areas.replicated.get(SYNC_KEY).await {
            Ok(raw) => decode_list(raw.as_ref(), now_millis()),
            Err(e) => {
                tracing::warn!("failed to read bookmarks: {}", e);
                Vec::new()
            }
        }
    }

    /// Sort and write the whole list, keeping the first entry for each id.
    async fn write_list(&self, mut entries: Vec<BookmarkEntry>) -> Result<()> {
        sort_newest_first(&mut entries);
        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert(e.id.clone()));
        let value = serde_json::to_value(&entries)?;
        self.areas.replicated.set(SYNC_KEY, value).await
    }

    /// Persist a bookmark, replacing any entry with the same canonical id.
    pub async fn add(&self, candidate: BookmarkCandidate) -> Result<BookmarkEntry> {
        let id = candidate
            .canonical_id()
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let content = candidate.content.as_deref().unwrap_or("");
        let has_content = !content.is_empty() && self.save_content(&id, content).await;

        let conversation_title = candidate
            .conversation_title
            .clone()
            .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());
        let title = derive_title(
            candidate.title.as_deref(),
            &[
                candidate.content.as_deref(),
                candidate.snippet.as_deref(),
                Some(&conversation_title),
            ],
        );
        let url = match candidate.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => build_conversation_url(
                candidate.origin.as_deref(),
                candidate.project_id.as_deref(),
                candidate.conversation_id.as_deref(),
                "",
            ),
        };

        let entry = BookmarkEntry {
            message_id: candidate
                .message_id
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| id.clone()),
            id: id.clone(),
            conversation_id: candidate.conversation_id.clone(),
            conversation_title,
            project_id: candidate.project_id.clone(),
            project_title: candidate.project_title.clone(),
            origin: candidate.origin.clone(),
            title,
            snippet: candidate.snippet_text(),
            url,
            saved_at: candidate.saved_at.unwrap_or_else(now_millis),
            has_content,
        };

        let mut entries = self.list().await;
        entries.retain(|e| e.id != id);
        entries.push(entry.clone());

        if let Err(e) = self.write_list(entries).await {
            if has_content {
                self.remove_content(&id).await;
            }
            return Err(e);
        }

        tracing::info!("bookmarked {}", id);
        Ok(entry)
    }

    /// Delete the bookmark with `id` and its overflow blob.
    ///
    /// An empty id is a no-op. Blob removal is best effort.
    pub async fn remove(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let mut entries = self.list().await;
        entries.retain(|e| e.id != id);
        self.write_list(entries).await?;
        self.remove_content(id).await;
        tracing::info!("removed bookmark {}", id);
        Ok(())
    }

    /// Merge `patch` into the bookmark with `id`. `Ok(None)` when absent.
    pub async fn update(&self, id: &str, patch: &BookmarkPatch) -> Result<Option<BookmarkEntry>> {
        if id.is_empty() {
            return Err(BookmarkError::InvalidArgument(
                "bookmark id is required".to_string(),
            ));
        }
        let mut entries = self.list().await;
        let Some(current) = entries.iter().find(|e| e.id == id) else {
            return Ok(None);
        };
        let updated = patch.apply(current);
        entries.retain(|e| e.id != id);
        entries.push(updated.clone());
        self.write_list(entries).await?;
        Ok(Some(updated))
    }

    /// Deliver the normalized list whenever any writer sharing the replicated
    /// store changes it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Vec<BookmarkEntry>) + Send + Sync + 'static,
    {
        self.areas.replicated.watch(Arc::new(move |change: &StoreChange| {
            if change.key == SYNC_KEY {
                callback(decode_list(change.new_value.as_ref(), now_millis()));
            }
        }))
    }

    /// Overflow content saved with bookmark `id`, if any.
    pub async fn content(&self, id: &str) -> Option<ContentBlob> {
        if id.is_empty() {
            return None;
        }
        match self.areas.local.get(&content_key(id)).await {
            Ok(Some(value)) => match serde_json::from_value::<ContentBlob>(value) {
                Ok(blob) => Some(blob),
                Err(e) => {
                    tracing::warn!("ignoring malformed content blob for {}: {}", id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("failed to read content for {}: {}", id, e);
                None
            }
        }
    }

    /// Returns whether the blob was persisted.
    async fn save_content(&self, id: &str, content: &str) -> bool {
        if !self.areas.local.is_available() {
            return false;
        }
        let blob = ContentBlob {
            content: truncate_chars(content, LOCAL_CONTENT_MAX_CHARS).to_string(),
            updated_at: now_millis(),
        };
        let value = match serde_json::to_value(&blob) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to encode content for {}: {}", id, e);
                return false;
            }
        };
        match self.areas.local.set(&content_key(id), value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to save content for {}: {}", id, e);
                false
            }
        }
    }

    async fn remove_content(&self, id: &str) {
        if let Err(e) = self.areas.local.remove(&content_key(id)).await {
            tracing::warn!("failed to remove content for {}: {}", id, e);
        }
    }
}
