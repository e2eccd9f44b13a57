//! Page context: where a bookmark lives and how to navigate back to it.

use url::Url;

use crate::constants::page::{PROJECT_TITLE_SELECTORS, TEST_ID_ATTR};
use crate::constants::DEFAULT_CONVERSATION_TITLE;
use crate::dom::PageTree;

/// Grouping identifiers read from the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub origin: Option<String>,
    pub project_id: Option<String>,
    pub conversation_id: Option<String>,
    pub project_title: Option<String>,
}

impl PageContext {
    /// Parse origin, project and conversation from a page location.
    ///
    /// Recognized paths are `/p/<project>[/.../c/<conversation>]` and
    /// `/c/<conversation>`; anything else yields neither id.
    pub fn from_location(href: &str) -> Self {
        let Ok(url) = Url::parse(href) else {
            return Self::default();
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let mut project_id = None;
        let mut conversation_id = None;
        match segments.first() {
            Some(&"p") => {
                project_id = segments.get(1).map(|s| s.to_string());
                if let Some(idx) = segments.iter().position(|s| *s == "c") {
                    conversation_id = segments.get(idx + 1).map(|s| s.to_string());
                }
            }
            Some(&"c") => {
                conversation_id = segments.get(1).map(|s| s.to_string());
            }
            _ => {}
        }

        Self {
            origin: origin_of(&url),
            project_id,
            conversation_id,
            project_title: None,
        }
    }

    /// Read the full context from a live tree, including the project title.
    pub fn read<T: PageTree>(tree: &T) -> Self {
        Self {
            project_title: project_title(tree),
            ..Self::from_location(tree.location())
        }
    }

    /// Navigable location for this context, relative to `current_location`.
    pub fn target_url(&self, current_location: &str) -> String {
        build_conversation_url(
            self.origin.as_deref(),
            self.project_id.as_deref(),
            self.conversation_id.as_deref(),
            current_location,
        )
    }
}

fn origin_of(url: &Url) -> Option<String> {
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Build `origin/p/<project>/c/<conversation>` from whichever segments are
/// present.
///
/// With neither id present the result is `current_location` unchanged. A
/// missing `origin` is taken from `current_location`.
pub fn build_conversation_url(
    origin: Option<&str>,
    project_id: Option<&str>,
    conversation_id: Option<&str>,
    current_location: &str,
) -> String {
    let mut segments = Vec::new();
    if let Some(project_id) = project_id.filter(|s| !s.is_empty()) {
        segments.push("p");
        segments.push(project_id);
    }
    if let Some(conversation_id) = conversation_id.filter(|s| !s.is_empty()) {
        segments.push("c");
        segments.push(conversation_id);
    }

    if segments.is_empty() {
        return current_location.to_string();
    }

    let base = match origin.filter(|s| !s.is_empty()) {
        Some(origin) => origin.trim_end_matches('/').to_string(),
        None => Url::parse(current_location)
            .ok()
            .and_then(|url| origin_of(&url))
            .unwrap_or_default(),
    };

    format!("{}/{}", base, segments.join("/"))
}

/// Conversation label from the document title, without the site suffix.
pub fn conversation_title(document_title: &str) -> String {
    let stripped = match document_title.find(" - ChatGPT") {
        Some(idx) => &document_title[..idx],
        None => document_title,
    };
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        DEFAULT_CONVERSATION_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// First non-blank project label found on the page.
pub fn project_title<T: PageTree>(tree: &T) -> Option<String> {
    let body = tree.body();
    PROJECT_TITLE_SELECTORS.iter().find_map(|&(test_id, tag)| {
        let has_test_id = |t: &T, n: T::Node| t.attr(n, TEST_ID_ATTR) == Some(test_id);
        let found = match tag {
            None => tree.query_first(body, has_test_id),
            Some(tag) => tree.query_first(body, |t, n| {
                t.tag_name(n) == Some(tag)
                    && t.parent(n).and_then(|p| t.closest(p, has_test_id)).is_some()
            }),
        };
        // Only the first match per selector is considered
        found.and_then(|n| non_blank(tree.text(n)))
    })
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::page::PROJECT_HEADER_TEST_ID;
    use crate::dom::Document;

    #[test]
    fn test_context_from_conversation_path() {
        let ctx = PageContext::from_location("https://chatgpt.com/c/abc-123");
        assert_eq!(ctx.origin.as_deref(), Some("https://chatgpt.com"));
        assert_eq!(ctx.project_id, None);
        assert_eq!(ctx.conversation_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_context_from_project_path() {
        let ctx = PageContext::from_location("https://chatgpt.com/p/g-p-1/c/abc");
        assert_eq!(ctx.project_id.as_deref(), Some("g-p-1"));
        assert_eq!(ctx.conversation_id.as_deref(), Some("abc"));

        let ctx = PageContext::from_location("https://chatgpt.com/p/g-p-1/project");
        assert_eq!(ctx.project_id.as_deref(), Some("g-p-1"));
        assert_eq!(ctx.conversation_id, None);
    }

    #[test]
    fn test_context_from_unrecognized_location() {
        let ctx = PageContext::from_location("https://chatgpt.com/");
        assert_eq!(ctx.origin.as_deref(), Some("https://chatgpt.com"));
        assert_eq!(ctx.project_id, None);
        assert_eq!(ctx.conversation_id, None);

        assert_eq!(PageContext::from_location("not a url"), PageContext::default());
    }

    #[test]
    fn test_build_conversation_url_segments() {
        let current = "https://chatgpt.com/somewhere?x=1";
        assert_eq!(
            build_conversation_url(Some("https://chatgpt.com"), Some("p1"), Some("c1"), current),
            "https://chatgpt.com/p/p1/c/c1"
        );
        assert_eq!(
            build_conversation_url(Some("https://chatgpt.com"), None, Some("c1"), current),
            "https://chatgpt.com/c/c1"
        );
        assert_eq!(
            build_conversation_url(Some("https://chatgpt.com"), Some("p1"), None, current),
            "https://chatgpt.com/p/p1"
        );
        assert_eq!(
            build_conversation_url(Some("https://chatgpt.com"), None, None, current),
            current
        );
        // Origin falls back to the current location's
        assert_eq!(
            build_conversation_url(None, None, Some("c9"), current),
            "https://chatgpt.com/c/c9"
        );
    }

    #[test]
    fn test_conversation_title() {
        assert_eq!(conversation_title("Geography - ChatGPT"), "Geography");
        assert_eq!(conversation_title("Geography - ChatGPT Plus"), "Geography");
        assert_eq!(conversation_title("  Plain  "), "Plain");
        assert_eq!(conversation_title(" - ChatGPT"), DEFAULT_CONVERSATION_TITLE);
        assert_eq!(conversation_title(""), DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn test_project_title_lookup() {
        let mut doc = Document::new("https://chatgpt.com/p/p1/c/c1", "Chat");
        let body = doc.body();
        assert_eq!(project_title(&doc), None);

        let header = doc.create_element("header");
        doc.set_attr(header, TEST_ID_ATTR, PROJECT_HEADER_TEST_ID);
        let span = doc.create_element("span");
        doc.append_text(span, "  Travel  ");
        doc.append_child(header, span);
        doc.append_child(body, header);
        assert_eq!(project_title(&doc).as_deref(), Some("Travel"));

        // The header outranks the workspace switcher and project name
        let named = doc.create_element("div");
        doc.set_attr(named, TEST_ID_ATTR, "project-name");
        doc.append_text(named, "Research");
        doc.append_child(body, named);
        assert_eq!(project_title(&doc).as_deref(), Some("Travel"));

        let heading = doc.create_element("h1");
        doc.append_text(heading, "Trips");
        doc.prepend_child(header, heading);
        assert_eq!(project_title(&doc).as_deref(), Some("Trips"));

        let titled = doc.create_element("div");
        doc.set_attr(titled, TEST_ID_ATTR, "project-title");
        doc.append_text(titled, "Research");
        doc.append_child(body, titled);

        let ctx = PageContext::read(&doc);
        assert_eq!(ctx.project_id.as_deref(), Some("p1"));
        assert_eq!(ctx.project_title.as_deref(), Some("Research"));
        assert_eq!(ctx.target_url(doc.location()), "https://chatgpt.com/p/p1/c/c1");
    }
}
