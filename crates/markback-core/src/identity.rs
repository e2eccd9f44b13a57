//! Identity of answer nodes.
//!
//! The host page rebuilds its tree freely, so an answer is matched back to its
//! bookmark by an identity derived from page attributes, or from its text when
//! the page offers none. The annotation layer and the highlight reconciler
//! must derive identities through the same functions here.

use crate::constants::page::{
    ASSISTANT_ROLE, AUTHOR_ROLE_ATTR, MARKDOWN_CLASS, MESSAGE_ID_ATTR, TEST_ID_ATTR,
    TURN_ID_ATTR, TURN_TEST_ID,
};
use crate::dom::PageTree;

pub fn is_message_node<T: PageTree>(tree: &T, node: T::Node) -> bool {
    tree.attr(node, MESSAGE_ID_ATTR).is_some()
}

fn is_assistant<T: PageTree>(tree: &T, node: T::Node) -> bool {
    tree.attr(node, AUTHOR_ROLE_ATTR) == Some(ASSISTANT_ROLE)
}

pub fn is_turn<T: PageTree>(tree: &T, node: T::Node) -> bool {
    tree.attr(node, TEST_ID_ATTR) == Some(TURN_TEST_ID)
}

/// The assistant answer element `node` belongs to, if any.
pub fn answer_host<T: PageTree>(tree: &T, node: T::Node) -> Option<T::Node> {
    if !tree.is_element(node) {
        return None;
    }
    if is_message_node(tree, node) && is_assistant(tree, node) {
        return Some(node);
    }
    tree.closest(node, |t, n| is_assistant(t, n))
}

/// Every assistant answer element under `root`, whether or not the page
/// tagged it with a message id.
pub fn answer_hosts<T: PageTree>(tree: &T, root: T::Node) -> Vec<T::Node> {
    tree.query_all(root, |t, n| is_assistant(t, n))
}

/// The assistant answer under `root` whose derived identity is `id`.
pub fn find_answer<T: PageTree>(tree: &T, root: T::Node, id: &str) -> Option<T::Node> {
    answer_hosts(tree, root)
        .into_iter()
        .find(|&host| message_id(tree, host).as_deref() == Some(id))
}

/// The rendered-markdown element of an answer host.
pub fn markdown_of<T: PageTree>(tree: &T, host: T::Node) -> Option<T::Node> {
    tree.query_first(host, |t, n| t.has_class(n, MARKDOWN_CLASS))
}

/// Derive the identity of an answer host.
///
/// Priority: the host's own message id, the enclosing turn's id, then a hash
/// of the answer's rendered text. Returns `None` when the host has neither
/// attribute nor text.
pub fn message_id<T: PageTree>(tree: &T, host: T::Node) -> Option<String> {
    if let Some(id) = tree.attr(host, MESSAGE_ID_ATTR).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }

    let turn_id = tree
        .closest(host, |t, n| is_turn(t, n))
        .and_then(|turn| tree.attr(turn, TURN_ID_ATTR))
        .filter(|id| !id.is_empty());
    if let Some(id) = turn_id {
        return Some(id.to_string());
    }

    let markdown = markdown_of(tree, host)?;
    let text = tree.text(markdown);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(hash_text(text))
}

/// 32-bit polynomial rolling hash over UTF-16 code units, rendered `tx_<abs>`.
///
/// Identical texts collide by construction; the hash only has to be stable
/// across reloads of the same answer.
pub fn hash_text(text: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("tx_{}", i64::from(hash).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fixtures::*;

    #[test]
    fn test_hash_text_known_values() {
        assert_eq!(hash_text(""), "tx_0");
        assert_eq!(hash_text("a"), "tx_97");
        assert_eq!(hash_text("ab"), "tx_3105");
        assert_eq!(hash_text("hello"), "tx_99162322");
        // Wraps past i32 in the middle of the fold
        assert_eq!(hash_text("hello world"), "tx_1794106052");
    }

    #[test]
    fn test_find_answer_by_derived_identity() {
        let mut doc = document();
        let tagged = attach_answer(&mut doc, "m1", "first");
        let turn = answer(&mut doc, Some("turn-7"), None, "second");
        let body = doc.body();
        doc.append_child(body, turn.turn);

        assert_eq!(answer_hosts(&doc, body), vec![tagged.host, turn.host]);
        assert_eq!(find_answer(&doc, body, "turn-7"), Some(turn.host));
        assert_eq!(find_answer(&doc, body, "m1"), Some(tagged.host));
        assert_eq!(find_answer(&doc, body, "nope"), None);
    }

    #[test]
    fn test_explicit_message_id_wins() {
        let mut doc = document();
        let a = answer(&mut doc, Some("turn-1"), Some("m1"), "text");
        assert_eq!(message_id(&doc, a.host), Some("m1".to_string()));
    }

    #[test]
    fn test_turn_id_fallback() {
        let mut doc = document();
        let a = answer(&mut doc, Some("turn-1"), None, "text");
        assert_eq!(message_id(&doc, a.host), Some("turn-1".to_string()));
    }

    #[test]
    fn test_text_hash_fallback_is_stable_and_collides() {
        let mut doc = document();
        let a = answer(&mut doc, None, None, "The capital of France is Paris.");
        let b = answer(&mut doc, None, None, "The capital of France is Paris.");

        let first = message_id(&doc, a.host);
        assert_eq!(first, message_id(&doc, a.host));
        assert!(first.as_deref().is_some_and(|id| id.starts_with("tx_")));
        // Same visible text, same identity
        assert_eq!(first, message_id(&doc, b.host));
    }

    #[test]
    fn test_no_identity_without_text() {
        let mut doc = document();
        let a = answer(&mut doc, None, None, "   ");
        assert_eq!(message_id(&doc, a.host), None);
    }

    #[test]
    fn test_answer_host_resolution() {
        let mut doc = document();
        let a = answer(&mut doc, None, Some("m1"), "text");
        assert_eq!(answer_host(&doc, a.markdown), Some(a.host));
        assert_eq!(answer_host(&doc, a.host), Some(a.host));
        assert_eq!(answer_host(&doc, a.turn), None);

        let user = doc.create_element("div");
        doc.set_attr(user, MESSAGE_ID_ATTR, "u1");
        doc.set_attr(user, AUTHOR_ROLE_ATTR, "user");
        assert_eq!(answer_host(&doc, user), None);
    }
}
