use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_CONVERSATION_TITLE, SNIPPET_MAX_LENGTH};
use crate::title::{derive_title, truncate_chars};

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One bookmarked answer, as stored in the replicated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    /// Canonical id, the list's primary key
    pub id: String,
    /// Identity used to find the answer on the page
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub conversation_title: String,
    pub project_id: Option<String>,
    pub project_title: Option<String>,
    /// Base address for rebuilding a navigable location
    pub origin: Option<String>,
    pub title: String,
    pub snippet: String,
    pub url: String,
    /// Epoch millis
    pub saved_at: i64,
    /// True iff an overflow content blob was written with this entry
    pub has_content: bool,
}

impl BookmarkEntry {
    /// Key the annotation layer matches page identities against.
    pub fn identity(&self) -> &str {
        if self.message_id.is_empty() {
            &self.id
        } else {
            &self.message_id
        }
    }
}

/// Sort newest first. Stable, so equal timestamps keep list order.
pub fn sort_newest_first(entries: &mut [BookmarkEntry]) {
    entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
}

/// Stored entry as found on disk: any field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredEntry {
    id: Option<String>,
    message_id: Option<String>,
    conversation_id: Option<String>,
    conversation_title: Option<String>,
    project_id: Option<String>,
    project_title: Option<String>,
    origin: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
    url: Option<String>,
    saved_at: Option<i64>,
    has_content: Option<bool>,
}

impl StoredEntry {
    fn normalize(self, now: i64) -> Option<BookmarkEntry> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let snippet = self.snippet.unwrap_or_default();
        let title = derive_title(
            self.title.as_deref(),
            &[Some(snippet.as_str()), self.conversation_title.as_deref()],
        );
        Some(BookmarkEntry {
            message_id: self
                .message_id
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| id.clone()),
            id,
            conversation_id: self.conversation_id,
            conversation_title: self
                .conversation_title
                .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string()),
            project_id: self.project_id,
            project_title: self.project_title,
            origin: self.origin,
            title,
            snippet,
            url: self.url.unwrap_or_default(),
            saved_at: self.saved_at.unwrap_or(now),
            has_content: self.has_content.unwrap_or(false),
        })
    }
}

/// Decode the stored list leniently and return it newest first.
///
/// A missing or non-array value is an empty list. Elements that are not
/// objects, do not decode, or have no id are dropped.
pub fn decode_list(raw: Option<&Value>, now: i64) -> Vec<BookmarkEntry> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };

    let mut entries: Vec<BookmarkEntry> = items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| match StoredEntry::deserialize(item) {
            Ok(stored) => stored.normalize(now),
            Err(e) => {
                tracing::debug!("dropping undecodable bookmark entry: {}", e);
                None
            }
        })
        .collect();
    sort_newest_first(&mut entries);
    entries
}

/// Bookmark request built by a surface before the store assigns its id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkCandidate {
    pub id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub conversation_title: Option<String>,
    pub project_id: Option<String>,
    pub project_title: Option<String>,
    pub origin: Option<String>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    /// Full answer text, stored as an overflow blob
    pub content: Option<String>,
    pub url: Option<String>,
    pub saved_at: Option<i64>,
}

impl BookmarkCandidate {
    /// Canonical id: message id, then id. `None` means one must be generated.
    pub fn canonical_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.is_empty()))
    }

    pub(crate) fn snippet_text(&self) -> String {
        truncate_chars(self.snippet.as_deref().unwrap_or(""), SNIPPET_MAX_LENGTH).to_string()
    }
}

/// Fields a surface may change on an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkPatch {
    /// Re-derived through the title rules when present
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub conversation_title: Option<String>,
    pub project_title: Option<String>,
    pub url: Option<String>,
}

impl BookmarkPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Merge onto `current`, returning the patched entry.
    pub fn apply(&self, current: &BookmarkEntry) -> BookmarkEntry {
        let mut next = current.clone();
        if let Some(snippet) = &self.snippet {
            next.snippet = truncate_chars(snippet, SNIPPET_MAX_LENGTH).to_string();
        }
        if let Some(conversation_title) = &self.conversation_title {
            next.conversation_title = conversation_title.clone();
        }
        if let Some(project_title) = &self.project_title {
            next.project_title = Some(project_title.clone());
        }
        if let Some(url) = &self.url {
            next.url = url.clone();
        }
        if let Some(title) = &self.title {
            let snippet = self.snippet.as_deref().unwrap_or(&current.snippet);
            next.title = derive_title(
                Some(title),
                &[Some(snippet), Some(&current.conversation_title)],
            );
        }
        next
    }
}

/// Overflow payload kept in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlob {
    pub content: String,
    pub updated_at: i64,
}
