//! Bookmark controls on answer nodes.
//!
//! Every operation is idempotent: scanning a subtree twice, or receiving the
//! same inserted node in several mutation batches, converges on one control
//! per answer whose state mirrors the store.

use std::collections::{HashMap, HashSet};

use crate::constants::control::{
    ACTIVE_CLASS, BUTTON_CLASS, CONTROL_ID_ATTR, ENHANCED_ATTR, LABEL_ADD, LABEL_REMOVE,
    WRAPPER_CLASS,
};
use crate::constants::SNIPPET_MAX_LENGTH;
use crate::dom::PageTree;
use crate::error::BookmarkError;
use crate::identity::{answer_host, is_message_node, markdown_of, message_id};
use crate::models::{now_millis, BookmarkCandidate, BookmarkEntry};
use crate::page::{conversation_title, PageContext};
use crate::store::BookmarkStore;
use crate::title::{accept_prompted_title, derive_title, truncate_chars};

/// Asks the user for a bookmark title.
pub trait TitlePrompt: Send {
    /// Raw answer for a prompt prefilled with `default_title`; `None` when the
    /// user cancels.
    fn prompt(&mut self, default_title: &str) -> Option<String>;
}

impl<F> TitlePrompt for F
where
    F: FnMut(&str) -> Option<String> + Send,
{
    fn prompt(&mut self, default_title: &str) -> Option<String> {
        self(default_title)
    }
}

/// Accepts every suggested title unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefault;

impl TitlePrompt for AcceptDefault {
    fn prompt(&mut self, default_title: &str) -> Option<String> {
        Some(default_title.to_string())
    }
}

#[derive(Debug)]
pub enum ToggleOutcome {
    Added(BookmarkEntry),
    /// Carries the removed entry id
    Removed(String),
    /// The title prompt was dismissed; nothing changed.
    Cancelled,
    /// The control is unknown or its answer has no identity.
    Skipped,
    /// The store rejected the change; the control keeps its state.
    Failed(BookmarkError),
}

/// An answer host that now carries a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotated<N> {
    pub message_id: String,
    pub host: N,
}

/// Control of an answer host, if one was attached.
pub fn control_of<T: PageTree>(tree: &T, host: T::Node) -> Option<T::Node> {
    tree.query_first(host, |t, n| t.has_class(n, BUTTON_CLASS))
}

pub struct AnnotationEngine<N> {
    /// Identity to stored entry id
    bookmarked: HashMap<String, String>,
    /// Control to the markdown node it bookmarks
    controls: HashMap<N, N>,
}

impl<N> Default for AnnotationEngine<N> {
    fn default() -> Self {
        Self {
            bookmarked: HashMap::new(),
            controls: HashMap::new(),
        }
    }
}

impl<N: Copy + Eq + std::hash::Hash> AnnotationEngine<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bookmarked(&self, message_id: &str) -> bool {
        self.bookmarked.contains_key(message_id)
    }

    /// Stored entry id for an identity.
    pub fn entry_id(&self, message_id: &str) -> Option<&str> {
        self.bookmarked.get(message_id).map(String::as_str)
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Annotate every assistant answer under `root` (inclusive).
    pub fn scan<T>(&mut self, tree: &mut T, root: N) -> Vec<Annotated<N>>
    where
        T: PageTree<Node = N>,
    {
        let hosts: Vec<N> = tree
            .query_all(root, |t, n| is_message_node(t, n))
            .into_iter()
            .filter_map(|n| answer_host(tree, n))
            .collect();

        let mut seen = HashSet::new();
        hosts
            .into_iter()
            .filter(|host| seen.insert(*host))
            .filter_map(|host| self.annotate(tree, host))
            .collect()
    }

    /// Annotate the answer `node` belongs to.
    ///
    /// Returns `None` when the node is not inside an assistant answer, or the
    /// answer has no markdown body or no identity yet.
    pub fn annotate<T>(&mut self, tree: &mut T, node: N) -> Option<Annotated<N>>
    where
        T: PageTree<Node = N>,
    {
        let host = answer_host(tree, node)?;
        let markdown = markdown_of(tree, host)?;
        let id = message_id(tree, host)?;

        let control = ensure_control(tree, host);
        tree.set_attr(control, CONTROL_ID_ATTR, &id);
        paint(tree, control, self.bookmarked.contains_key(&id));
        self.controls.entry(control).or_insert(markdown);

        Some(Annotated {
            message_id: id,
            host,
        })
    }

    /// Process the roots of inserted subtrees from one mutation batch.
    pub fn handle_mutations<T>(&mut self, tree: &mut T, added: &[N]) -> Vec<Annotated<N>>
    where
        T: PageTree<Node = N>,
    {
        self.prune(tree);
        let mut annotated = Vec::new();
        for &node in added {
            if !tree.is_element(node) || !tree.is_connected(node) {
                continue;
            }
            if is_message_node(tree, node) {
                annotated.extend(self.annotate(tree, node));
            } else {
                annotated.extend(self.scan(tree, node));
            }
        }
        annotated
    }

    /// Rebuild bookmark state from `entries` and repaint every live control.
    pub fn refresh<T>(&mut self, tree: &mut T, entries: &[BookmarkEntry])
    where
        T: PageTree<Node = N>,
    {
        self.bookmarked = entries
            .iter()
            .map(|e| (e.identity().to_string(), e.id.clone()))
            .collect();

        self.prune(tree);
        let controls: Vec<N> = self.controls.keys().copied().collect();
        for control in controls {
            let active = tree
                .attr(control, CONTROL_ID_ATTR)
                .is_some_and(|id| self.bookmarked.contains_key(id));
            paint(tree, control, active);
        }
    }

    /// Forget controls the page has thrown away.
    fn prune<T>(&mut self, tree: &T)
    where
        T: PageTree<Node = N>,
    {
        self.controls.retain(|&control, _| tree.is_connected(control));
    }

    /// Bookmark or un-bookmark the answer behind `control`.
    pub async fn toggle<T, P>(
        &mut self,
        tree: &mut T,
        control: N,
        store: &BookmarkStore,
        prompt: &mut P,
    ) -> ToggleOutcome
    where
        T: PageTree<Node = N>,
        P: TitlePrompt + ?Sized,
    {
        let Some(&markdown) = self.controls.get(&control) else {
            return ToggleOutcome::Skipped;
        };
        let Some(mut candidate) = build_candidate(tree, markdown) else {
            return ToggleOutcome::Skipped;
        };
        let key = candidate.message_id.clone().unwrap_or_default();

        if let Some(entry_id) = self.bookmarked.get(&key).cloned() {
            return match store.remove(&entry_id).await {
                Ok(()) => {
                    self.bookmarked.remove(&key);
                    paint(tree, control, false);
                    ToggleOutcome::Removed(entry_id)
                }
                Err(e) => {
                    tracing::error!("failed to remove bookmark {}: {}", entry_id, e);
                    ToggleOutcome::Failed(e)
                }
            };
        }

        let default_title = candidate.title.clone().unwrap_or_default();
        let response = prompt.prompt(&default_title);
        let Some(title) = accept_prompted_title(&default_title, response.as_deref()) else {
            return ToggleOutcome::Cancelled;
        };
        candidate.title = Some(title);

        match store.add(candidate).await {
            Ok(entry) => {
                self.bookmarked.insert(key, entry.id.clone());
                paint(tree, control, true);
                ToggleOutcome::Added(entry)
            }
            Err(e) => {
                tracing::error!("failed to add bookmark {}: {}", key, e);
                ToggleOutcome::Failed(e)
            }
        }
    }
}

/// Candidate for the answer rendered in `markdown`, read from the live page.
pub fn build_candidate<T: PageTree>(tree: &T, markdown: T::Node) -> Option<BookmarkCandidate> {
    let host = answer_host(tree, markdown)?;
    let id = message_id(tree, host)?;

    let text = tree.text(markdown);
    let text = text.trim();
    let snippet = truncate_chars(text, SNIPPET_MAX_LENGTH);
    let context = PageContext::read(tree);
    let url = context.target_url(tree.location());

    Some(BookmarkCandidate {
        id: Some(id.clone()),
        message_id: Some(id),
        conversation_id: context.conversation_id,
        conversation_title: Some(conversation_title(tree.title())),
        project_id: context.project_id,
        project_title: context.project_title,
        origin: context.origin,
        title: Some(derive_title(None, &[Some(text), Some(snippet)])),
        snippet: Some(snippet.to_string()),
        content: Some(text.to_string()),
        url: Some(url),
        saved_at: Some(now_millis()),
    })
}

/// Find the host's control, creating or repairing it as needed.
fn ensure_control<T: PageTree>(tree: &mut T, host: T::Node) -> T::Node {
    if tree.attr(host, ENHANCED_ATTR).is_some() {
        if let Some(existing) = control_of(tree, host) {
            return existing;
        }
        tracing::debug!("control missing from enhanced answer {:?}, reattaching", host);
    }

    let wrapper = tree.create_element("div");
    tree.set_class(wrapper, WRAPPER_CLASS, true);
    let button = tree.create_element("button");
    tree.set_attr(button, "type", "button");
    tree.set_class(button, BUTTON_CLASS, true);
    tree.prepend_child(wrapper, button);
    tree.prepend_child(host, wrapper);
    tree.set_attr(host, ENHANCED_ATTR, "true");
    button
}

fn paint<T: PageTree>(tree: &mut T, control: T::Node, active: bool) {
    let label = if active { LABEL_REMOVE } else { LABEL_ADD };
    tree.set_class(control, ACTIVE_CLASS, active);
    tree.set_attr(control, "aria-pressed", if active { "true" } else { "false" });
    tree.set_attr(control, "title", label);
    tree.set_attr(control, "aria-label", label);
}
