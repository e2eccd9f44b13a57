//! Bookmarks for answers on a live, continuously rebuilt conversation page.
//!
//! The persistence side keeps a small replicated bookmark list consistent
//! with large device-local content blobs ([`BookmarkStore`]). The page side
//! attaches bookmark controls to answers and re-locates bookmarked answers
//! while the page is still rendering them ([`PageRuntime`]).

pub mod annotate;
pub mod config;
pub mod constants;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod identity;
pub mod messaging;
pub mod models;
pub mod page;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod title;

pub use annotate::{AcceptDefault, AnnotationEngine, Annotated, TitlePrompt, ToggleOutcome};
pub use config::{CoreConfig, HighlightConfig, RetryPolicy};
pub use dom::{Document, NodeId, PageTree};
pub use error::{BookmarkError, Result, TransportError};
pub use highlight::{HighlightReconciler, HighlightState};
pub use messaging::{
    dispatch, router_message, send_highlight_with_retry, target_url, HighlightPayload,
    HighlightResponse, HighlightTransport, PageRequest, RouterResponse,
};
pub use models::{BookmarkCandidate, BookmarkEntry, BookmarkPatch, ContentBlob};
pub use page::PageContext;
pub use runtime::{PageEvent, PageRuntime, RuntimeHandle};
pub use storage::{KeyedStore, StorageAreas, StoreArea, StoreChange, Subscription};
pub use store::BookmarkStore;
