//! Bounded-retry highlighting of a bookmarked answer.
//!
//! A highlight request may arrive before the page has rendered its target.
//! The request then stays pending and is retried from two sources: the
//! periodic tick, which counts toward the attempt ceiling, and fresh
//! annotations, which do not. Both go through the same locate routine.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::annotate::Annotated;
use crate::config::HighlightConfig;
use crate::constants::control::HIGHLIGHT_CLASS;
use crate::constants::page::MESSAGE_ID_ATTR;
use crate::dom::PageTree;
use crate::identity::{answer_host, find_answer, is_turn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightState {
    Idle,
    Pending { target: String, attempts: u32 },
}

pub struct HighlightReconciler<N> {
    state: HighlightState,
    /// Highlighted node to the instant its highlight ends
    active: HashMap<N, Instant>,
    config: HighlightConfig,
}

impl<N: Copy + Eq + Hash> HighlightReconciler<N> {
    pub fn new(config: HighlightConfig) -> Self {
        Self {
            state: HighlightState::Idle,
            active: HashMap::new(),
            config,
        }
    }

    pub fn state(&self) -> &HighlightState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, HighlightState::Pending { .. })
    }

    pub fn is_highlighted(&self, node: N) -> bool {
        self.active.contains_key(&node)
    }

    /// Try to highlight `target` now, leaving it pending on failure.
    ///
    /// A new request replaces any pending one.
    pub fn request<T>(&mut self, tree: &mut T, target: &str, now: Instant) -> bool
    where
        T: PageTree<Node = N>,
    {
        if target.is_empty() {
            return false;
        }
        if self.try_highlight(tree, target, now) {
            self.state = HighlightState::Idle;
            return true;
        }
        tracing::debug!("highlight target {} not on page yet", target);
        self.state = HighlightState::Pending {
            target: target.to_string(),
            attempts: 0,
        };
        false
    }

    /// Periodic source: expire finished highlights, then retry the pending
    /// request, abandoning it past the attempt ceiling.
    pub fn tick<T>(&mut self, tree: &mut T, now: Instant)
    where
        T: PageTree<Node = N>,
    {
        self.expire(tree, now);

        let HighlightState::Pending { target, attempts } = &self.state else {
            return;
        };
        let (target, attempts) = (target.clone(), *attempts);

        if self.try_highlight(tree, &target, now) {
            self.state = HighlightState::Idle;
        } else if attempts > self.config.max_attempts {
            tracing::debug!("giving up on highlight target {} after {} attempts", target, attempts);
            self.state = HighlightState::Idle;
        } else {
            self.state = HighlightState::Pending {
                target,
                attempts: attempts + 1,
            };
        }
    }

    /// Retry the pending request without counting an attempt.
    pub fn retry_pending<T>(&mut self, tree: &mut T, now: Instant) -> bool
    where
        T: PageTree<Node = N>,
    {
        let HighlightState::Pending { target, .. } = &self.state else {
            return false;
        };
        let target = target.clone();
        if self.try_highlight(tree, &target, now) {
            self.state = HighlightState::Idle;
            return true;
        }
        false
    }

    /// Mutation source: highlight a freshly annotated answer that matches the
    /// pending target.
    pub fn on_annotated<T>(&mut self, tree: &mut T, annotated: &[Annotated<N>], now: Instant) -> bool
    where
        T: PageTree<Node = N>,
    {
        let HighlightState::Pending { target, .. } = &self.state else {
            return false;
        };
        let Some(found) = annotated.iter().find(|a| a.message_id == *target) else {
            return false;
        };
        let node = tree.closest(found.host, |t, n| is_turn(t, n)).unwrap_or(found.host);
        self.highlight(tree, node, now);
        self.state = HighlightState::Idle;
        true
    }

    /// Node to highlight for `target`: the enclosing turn of its answer, else
    /// the answer, else the tagged node itself.
    ///
    /// Answers without a matching attribute are found by the identity the
    /// annotation layer derives for them (turn id or text hash).
    pub fn locate<T>(&self, tree: &T, target: &str) -> Option<N>
    where
        T: PageTree<Node = N>,
    {
        if target.is_empty() {
            return None;
        }
        let body = tree.body();
        let base = match tree.query_first(body, |t, n| t.attr(n, MESSAGE_ID_ATTR) == Some(target)) {
            Some(node) => answer_host(tree, node).unwrap_or(node),
            None => find_answer(tree, body, target)?,
        };
        Some(tree.closest(base, |t, n| is_turn(t, n)).unwrap_or(base))
    }

    /// Scroll to `node` and mark it until `now + duration`, replacing any
    /// earlier deadline for the same node.
    pub fn highlight<T>(&mut self, tree: &mut T, node: N, now: Instant)
    where
        T: PageTree<Node = N>,
    {
        tree.scroll_into_view(node);
        tree.set_class(node, HIGHLIGHT_CLASS, true);
        self.active.insert(node, now + self.config.duration());
    }

    /// Clear highlights whose deadline has passed.
    pub fn expire<T>(&mut self, tree: &mut T, now: Instant)
    where
        T: PageTree<Node = N>,
    {
        let expired: Vec<N> = self
            .active
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&node, _)| node)
            .collect();
        for node in expired {
            self.active.remove(&node);
            tree.set_class(node, HIGHLIGHT_CLASS, false);
        }
    }

    /// Earliest pending highlight deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.values().min().copied()
    }

    /// Drop the pending request.
    pub fn cancel(&mut self) {
        self.state = HighlightState::Idle;
    }

    fn try_highlight<T>(&mut self, tree: &mut T, target: &str, now: Instant) -> bool
    where
        T: PageTree<Node = N>,
    {
        match self.locate(tree, target) {
            Some(node) => {
                self.highlight(tree, node, now);
                true
            }
            None => false,
        }
    }
}
