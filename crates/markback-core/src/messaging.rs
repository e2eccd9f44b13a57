//! Messages exchanged between surfaces.
//!
//! Two protocols share the transport: page requests (`{type, payload}`)
//! answered by a page runtime with `{ok}`, and router requests
//! (`{scope, type, payload}`) answered by the storage owner with
//! `{ok, data}` or `{ok, error}`.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::constants::MESSAGE_SCOPE;
use crate::error::{BookmarkError, TransportError};
use crate::models::{BookmarkCandidate, BookmarkEntry, BookmarkPatch};
use crate::page::build_conversation_url;
use crate::store::BookmarkStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighlightPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl HighlightPayload {
    /// Identity to highlight: the message id, falling back to the entry id.
    pub fn target(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Request delivered to a page runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PageRequest {
    #[serde(rename = "gpt-bookmarks:highlight", alias = "highlight")]
    Highlight(HighlightPayload),
}

impl PageRequest {
    pub fn highlight_entry(entry: &BookmarkEntry) -> Self {
        PageRequest::Highlight(HighlightPayload {
            message_id: Some(entry.message_id.clone()),
            id: Some(entry.id.clone()),
            snippet: Some(entry.snippet.clone()),
        })
    }

    /// Decode a raw message; anything that is not a page request is `None`.
    pub fn parse(message: &Value) -> Option<Self> {
        serde_json::from_value(message.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightResponse {
    pub ok: bool,
}

/// Delivers page requests to the page runtime of the active tab.
pub trait HighlightTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<HighlightResponse, TransportError>>;
}

/// Send `request`, retrying on transport errors and `{ok: false}` answers.
///
/// Returns true once any attempt is acknowledged with `ok`.
pub async fn send_highlight_with_retry<T>(
    transport: &T,
    request: &PageRequest,
    policy: &RetryPolicy,
) -> bool
where
    T: HighlightTransport + ?Sized,
{
    for attempt in 1..=policy.attempts {
        match transport.send(request).await {
            Ok(HighlightResponse { ok: true }) => return true,
            Ok(_) => tracing::debug!("highlight attempt {} not acknowledged", attempt),
            Err(e) => tracing::debug!("highlight attempt {} failed: {}", attempt, e),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay()).await;
        }
    }
    tracing::warn!("highlight request gave up after {} attempts", policy.attempts);
    false
}

/// Where to navigate for `entry`: its stored url, else a location rebuilt
/// from its grouping ids.
pub fn target_url(entry: &BookmarkEntry, current_location: &str) -> String {
    if !entry.url.is_empty() {
        return entry.url.clone();
    }
    build_conversation_url(
        entry.origin.as_deref(),
        entry.project_id.as_deref(),
        entry.conversation_id.as_deref(),
        current_location,
    )
}

/// Build a router request.
pub fn router_message(kind: &str, payload: Value) -> Value {
    serde_json::json!({
        "scope": MESSAGE_SCOPE,
        "type": kind,
        "payload": payload,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouterResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    id: Option<String>,
    #[serde(default)]
    patch: BookmarkPatch,
}

/// Answer a router request against `store`.
///
/// Messages without the bookmark scope are not handled and yield `None`.
pub async fn dispatch(store: &BookmarkStore, message: &Value) -> Option<RouterResponse> {
    if message.get("scope").and_then(Value::as_str) != Some(MESSAGE_SCOPE) {
        return None;
    }
    let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();
    let payload = message.get("payload").cloned().unwrap_or(Value::Null);

    let result = match kind {
        "list" => list(store).await,
        "add" => add(store, payload).await,
        "remove" => remove(store, &payload).await,
        "update" => update(store, payload).await,
        other => return Some(RouterResponse::failure(format!("Unknown message type: {}", other))),
    };

    Some(match result {
        Ok(data) => RouterResponse::success(data),
        Err(e) => {
            tracing::warn!("{} request failed: {}", kind, e);
            RouterResponse::failure(e.to_string())
        }
    })
}

async fn list(store: &BookmarkStore) -> Result<Value, BookmarkError> {
    Ok(serde_json::to_value(store.list().await)?)
}

async fn add(store: &BookmarkStore, payload: Value) -> Result<Value, BookmarkError> {
    if !payload.is_object() {
        return Err(BookmarkError::InvalidArgument(
            "bookmark payload is required".to_string(),
        ));
    }
    let mut candidate: BookmarkCandidate = serde_json::from_value(payload)?;
    if candidate.url.as_deref().map_or(true, str::is_empty) {
        candidate.url = Some(build_conversation_url(
            candidate.origin.as_deref(),
            candidate.project_id.as_deref(),
            candidate.conversation_id.as_deref(),
            "",
        ));
    }
    let saved = store.add(candidate).await?;
    Ok(serde_json::to_value(saved)?)
}

async fn remove(store: &BookmarkStore, payload: &Value) -> Result<Value, BookmarkError> {
    let id = payload.get("id").and_then(Value::as_str).unwrap_or_default();
    store.remove(id).await?;
    Ok(Value::Null)
}

async fn update(store: &BookmarkStore, payload: Value) -> Result<Value, BookmarkError> {
    let request: UpdatePayload = serde_json::from_value(payload)?;
    let updated = store
        .update(request.id.as_deref().unwrap_or_default(), &request.patch)
        .await?;
    Ok(serde_json::to_value(updated)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HIGHLIGHT_MESSAGE;
    use crate::storage::StorageAreas;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store() -> BookmarkStore {
        BookmarkStore::new(StorageAreas::in_memory())
    }

    #[test]
    fn test_page_request_wire_format() {
        let request = PageRequest::Highlight(HighlightPayload {
            message_id: Some("m1".into()),
            ..Default::default()
        });
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"type": HIGHLIGHT_MESSAGE, "payload": {"messageId": "m1"}}));

        let legacy = json!({"type": "highlight", "payload": {"id": "e1"}});
        let PageRequest::Highlight(payload) = PageRequest::parse(&legacy).unwrap();
        assert_eq!(payload.target(), Some("e1"));

        assert!(PageRequest::parse(&json!({"type": "other"})).is_none());
        assert!(PageRequest::parse(&json!(null)).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_foreign_scope() {
        let store = store();
        assert!(dispatch(&store, &json!({"type": "list"})).await.is_none());
        assert!(dispatch(&store, &json!({"scope": "other", "type": "list"}))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_type() {
        let response = dispatch(&store(), &router_message("explode", Value::Null))
            .await
            .unwrap();
        assert_eq!(response, RouterResponse::failure("Unknown message type: explode"));
    }

    #[tokio::test]
    async fn test_dispatch_add_fills_url_and_lists() {
        let store = store();
        let response = dispatch(
            &store,
            &router_message(
                "add",
                json!({
                    "messageId": "m1",
                    "origin": "https://chatgpt.com",
                    "projectId": "g-p-1",
                    "conversationId": "c1",
                    "snippet": "Paris"
                }),
            ),
        )
        .await
        .unwrap();
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["url"], "https://chatgpt.com/p/g-p-1/c/c1");
        assert_eq!(data["title"], "Paris");

        let listed = dispatch(&store, &router_message("list", Value::Null))
            .await
            .unwrap();
        assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_add_rejects_missing_payload() {
        let response = dispatch(&store(), &router_message("add", Value::Null))
            .await
            .unwrap();
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Invalid argument"));
    }

    #[tokio::test]
    async fn test_dispatch_update_and_remove() {
        let store = store();
        store
            .add(BookmarkCandidate {
                message_id: Some("m1".into()),
                snippet: Some("Paris".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let renamed = dispatch(
            &store,
            &router_message("update", json!({"id": "m1", "patch": {"title": "Capitals"}})),
        )
        .await
        .unwrap();
        assert_eq!(renamed.data.unwrap()["title"], "Capitals");

        let missing = dispatch(
            &store,
            &router_message("update", json!({"id": "nope", "patch": {"title": "x"}})),
        )
        .await
        .unwrap();
        assert!(missing.ok);
        assert_eq!(missing.data, Some(Value::Null));

        let no_id = dispatch(&store, &router_message("update", json!({"patch": {}})))
            .await
            .unwrap();
        assert!(!no_id.ok);

        let removed = dispatch(&store, &router_message("remove", json!({"id": "m1"})))
            .await
            .unwrap();
        assert!(removed.ok);
        assert!(store.list().await.is_empty());
    }

    #[test]
    fn test_target_url_prefers_stored_url() {
        let mut entry: BookmarkEntry = serde_json::from_value(json!({
            "id": "m1", "messageId": "m1", "conversationId": "c1", "conversationTitle": "ChatGPT",
            "projectId": null, "projectTitle": null, "origin": "https://chatgpt.com",
            "title": "t", "snippet": "s", "url": "https://chatgpt.com/c/stored",
            "savedAt": 1, "hasContent": false
        }))
        .unwrap();
        assert_eq!(target_url(&entry, "https://chatgpt.com/"), "https://chatgpt.com/c/stored");
        entry.url.clear();
        assert_eq!(target_url(&entry, "https://chatgpt.com/"), "https://chatgpt.com/c/c1");
    }

    /// Fails until `succeed_on`, then acknowledges.
    struct FlakyTransport {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl HighlightTransport for FlakyTransport {
        fn send<'a>(
            &'a self,
            _request: &'a PageRequest,
        ) -> BoxFuture<'a, Result<HighlightResponse, TransportError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                match call {
                    1 => Err(TransportError::Disconnected),
                    n if n < self.succeed_on => Ok(HighlightResponse { ok: false }),
                    _ => Ok(HighlightResponse { ok: true }),
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_first_ok() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let policy = RetryPolicy {
            attempts: 10,
            delay_ms: 1,
        };
        let request = PageRequest::Highlight(HighlightPayload::default());
        assert!(send_highlight_with_retry(&transport, &request, &policy).await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
        };
        let policy = RetryPolicy {
            attempts: 4,
            delay_ms: 1,
        };
        let request = PageRequest::Highlight(HighlightPayload::default());
        assert!(!send_highlight_with_retry(&transport, &request, &policy).await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }
}
