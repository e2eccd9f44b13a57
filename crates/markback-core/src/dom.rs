//! The element tree the annotation layer works against.
//!
//! [`PageTree`] is the seam between the engine and a live page. [`Document`]
//! is an arena-backed implementation that records inserted subtrees the way a
//! structural-mutation observer would report them.

use std::fmt::Debug;
use std::hash::Hash;

/// Operations the engine needs from a live element tree.
///
/// Nodes are cheap copyable handles; a handle stays valid after its node is
/// detached, which is how a rebuilt page looks to the engine.
pub trait PageTree {
    type Node: Copy + Eq + Hash + Debug;

    /// Root of the observed content (the page body).
    fn body(&self) -> Self::Node;
    /// Current location of the page.
    fn location(&self) -> &str;
    /// Current document title.
    fn title(&self) -> &str;

    fn is_element(&self, node: Self::Node) -> bool;
    fn tag_name(&self, node: Self::Node) -> Option<&str>;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
    /// True when `node` is reachable from [`body`](PageTree::body).
    fn is_connected(&self, node: Self::Node) -> bool;

    fn attr(&self, node: Self::Node, name: &str) -> Option<&str>;
    fn set_attr(&mut self, node: Self::Node, name: &str, value: &str);
    fn has_class(&self, node: Self::Node, class: &str) -> bool;
    fn set_class(&mut self, node: Self::Node, class: &str, on: bool);

    /// Rendered text of the subtree, block elements separated by line breaks.
    fn text(&self, node: Self::Node) -> String;

    fn create_element(&mut self, tag: &str) -> Self::Node;
    /// Insert `child` as the first child of `parent`.
    fn prepend_child(&mut self, parent: Self::Node, child: Self::Node);
    fn scroll_into_view(&mut self, node: Self::Node);

    /// Drain the roots of subtrees inserted since the last call, in insertion
    /// order.
    fn take_added_nodes(&mut self) -> Vec<Self::Node>;

    /// `node` itself or its nearest ancestor matching `pred`.
    fn closest<F>(&self, node: Self::Node, pred: F) -> Option<Self::Node>
    where
        F: Fn(&Self, Self::Node) -> bool,
    {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.is_element(n) && pred(self, n) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Pre-order traversal of `root` and its descendants.
    fn descendants(&self, root: Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            out.push(n);
            let children = self.children(n);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Elements under `root` (inclusive) matching `pred`, in document order.
    fn query_all<F>(&self, root: Self::Node, pred: F) -> Vec<Self::Node>
    where
        F: Fn(&Self, Self::Node) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.is_element(n) && pred(self, n))
            .collect()
    }

    fn query_first<F>(&self, root: Self::Node, pred: F) -> Option<Self::Node>
    where
        F: Fn(&Self, Self::Node) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .find(|&n| self.is_element(n) && pred(self, n))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        classes: Vec<String>,
    },
    Text(String),
}

#[derive(Debug)]
struct NodeRecord {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory element tree.
///
/// Nodes are never freed; detaching a subtree leaves its handles valid but
/// disconnected.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeRecord>,
    body: NodeId,
    location: String,
    title: String,
    added: Vec<NodeId>,
    scrolled: Vec<NodeId>,
}

impl Document {
    pub fn new(location: impl Into<String>, title: impl Into<String>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            location: location.into(),
            title: title.into(),
            added: Vec::new(),
            scrolled: Vec::new(),
        };
        doc.body = doc.push(NodeData::Element {
            tag: "body".to_string(),
            attributes: Vec::new(),
            classes: Vec::new(),
        });
        doc
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeRecord {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn record(&self, node: NodeId) -> &NodeRecord {
        &self.nodes[node.0 as usize]
    }

    fn record_mut(&mut self, node: NodeId) -> &mut NodeRecord {
        &mut self.nodes[node.0 as usize]
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Append `child` (detaching it from any previous parent).
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.record_mut(child).parent = Some(parent);
        self.record_mut(parent).children.push(child);
        self.note_insert(child);
    }

    /// Convenience: append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    /// Remove `node` from its parent; the subtree stays addressable.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.record_mut(node).parent.take() {
            self.record_mut(parent).children.retain(|&c| c != node);
        }
    }

    /// Nodes passed to `scroll_into_view`, oldest first.
    pub fn scroll_history(&self) -> &[NodeId] {
        &self.scrolled
    }

    fn note_insert(&mut self, node: NodeId) {
        if self.is_connected(node) {
            self.added.push(node);
        }
    }

    fn is_block(tag: &str) -> bool {
        matches!(
            tag,
            "p" | "div" | "section" | "article" | "li" | "ul" | "ol" | "pre" | "blockquote"
                | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table" | "tr" | "br"
        )
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.record(node).data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { tag, .. } => {
                let block = Self::is_block(tag);
                if block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                for &child in &self.record(node).children {
                    self.collect_text(child, out);
                }
                if block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
}

impl PageTree for Document {
    type Node = NodeId;

    fn body(&self) -> NodeId {
        self.body
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn is_element(&self, node: NodeId) -> bool {
        matches!(self.record(node).data, NodeData::Element { .. })
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.record(node).data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.record(node).parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.record(node).children.clone()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.body {
                return true;
            }
            current = self.record(n).parent;
        }
        false
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.record(node).data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.record_mut(node).data {
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        match &self.record(node).data {
            NodeData::Element { classes, .. } => classes.iter().any(|c| c == class),
            NodeData::Text(_) => false,
        }
    }

    fn set_class(&mut self, node: NodeId, class: &str, on: bool) {
        if let NodeData::Element { classes, .. } = &mut self.record_mut(node).data {
            let present = classes.iter().any(|c| c == class);
            if on && !present {
                classes.push(class.to_string());
            } else if !on && present {
                classes.retain(|c| c != class);
            }
        }
    }

    fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            classes: Vec::new(),
        })
    }

    fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.record_mut(child).parent = Some(parent);
        self.record_mut(parent).children.insert(0, child);
        self.note_insert(child);
    }

    fn scroll_into_view(&mut self, node: NodeId) {
        self.scrolled.push(node);
    }

    fn take_added_nodes(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.added)
    }
}
