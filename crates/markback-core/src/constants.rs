//! Storage keys, page selectors and limits shared by the store, the
//! annotation layer and the highlight reconciler.
//!
//! The storage keys and attribute names are part of the persisted format and
//! of the host page's markup; changing them orphans existing bookmarks.

/// Replicated-store key holding the whole bookmark list.
pub const SYNC_KEY: &str = "gptBookmarks";

/// Local-store key prefix for overflow content blobs.
pub const CONTENT_PREFIX: &str = "gptBookmarkContent:";

/// Content blobs are truncated to this many characters (2 MiB).
pub const LOCAL_CONTENT_MAX_CHARS: usize = 1024 * 1024 * 2;

pub const TITLE_MAX_LENGTH: usize = 120;
pub const SNIPPET_MAX_LENGTH: usize = 160;

/// Returned by title derivation when every candidate is blank.
pub const NO_TITLE: &str = "제목 없음";

pub const DEFAULT_CONVERSATION_TITLE: &str = "ChatGPT";

/// Scope tag carried by every router message.
pub const MESSAGE_SCOPE: &str = "gpt-bookmarks";

pub const HIGHLIGHT_MESSAGE: &str = "gpt-bookmarks:highlight";

// Host page markup
pub mod page {
    pub const MESSAGE_ID_ATTR: &str = "data-message-id";
    pub const AUTHOR_ROLE_ATTR: &str = "data-message-author-role";
    pub const ASSISTANT_ROLE: &str = "assistant";
    pub const TEST_ID_ATTR: &str = "data-testid";
    pub const TURN_TEST_ID: &str = "conversation-turn";
    pub const TURN_ID_ATTR: &str = "data-turn-id";
    pub const MARKDOWN_CLASS: &str = "markdown";

    pub const PROJECT_HEADER_TEST_ID: &str = "project-header";

    /// Where the current project's name may appear, tried in order. Each
    /// pair is a `data-testid` value and an optional descendant tag under it.
    pub const PROJECT_TITLE_SELECTORS: &[(&str, Option<&str>)] = &[
        ("project-title", None),
        ("project-header-title", None),
        (PROJECT_HEADER_TEST_ID, Some("h1")),
        (PROJECT_HEADER_TEST_ID, Some("span")),
        ("workspace-switcher-current", None),
        ("project-name", None),
    ];
}

// Markup owned by the annotation layer
pub mod control {
    pub const WRAPPER_CLASS: &str = "gpt-bookmark-wrapper";
    pub const BUTTON_CLASS: &str = "gpt-bookmark-btn";
    pub const ACTIVE_CLASS: &str = "is-active";
    pub const HIGHLIGHT_CLASS: &str = "gpt-bookmark-highlight";
    pub const ENHANCED_ATTR: &str = "data-gpt-bookmark-enhanced";
    /// Identity stamped on a control so repaints can find its bookmark state.
    pub const CONTROL_ID_ATTR: &str = "data-gpt-bookmark-id";
    pub const LABEL_ADD: &str = "즐겨찾기에 추가";
    pub const LABEL_REMOVE: &str = "즐겨찾기에서 제거";
}
