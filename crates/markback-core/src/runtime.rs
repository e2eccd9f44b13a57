//! Event loop of one page.
//!
//! The runtime owns the page tree, the annotation engine and the highlight
//! reconciler, and handles one event at a time, so none of that state is
//! locked. Store changes, tree edits, toggles and highlight requests arrive
//! over a channel; the retry tick and highlight expiry are timers inside the
//! loop.

use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::annotate::{AnnotationEngine, TitlePrompt, ToggleOutcome};
use crate::config::HighlightConfig;
use crate::dom::PageTree;
use crate::error::TransportError;
use crate::highlight::HighlightReconciler;
use crate::messaging::{HighlightResponse, HighlightTransport, PageRequest};
use crate::models::BookmarkEntry;
use crate::store::BookmarkStore;

pub type TreeEdit<T> = Box<dyn FnOnce(&mut T) + Send>;

pub enum PageEvent<T: PageTree> {
    /// The bookmark list changed in the replicated store.
    StoreChanged(Vec<BookmarkEntry>),
    /// The tree was changed elsewhere; drain its inserted nodes.
    Mutations,
    /// Change the tree, then process the resulting mutations.
    Edit(TreeEdit<T>),
    Highlight {
        request: PageRequest,
        reply: oneshot::Sender<HighlightResponse>,
    },
    /// The user clicked a bookmark control.
    Toggle {
        control: T::Node,
        prompt: Box<dyn TitlePrompt>,
        reply: oneshot::Sender<ToggleOutcome>,
    },
    Shutdown,
}

/// Sends events to a running [`PageRuntime`].
pub struct RuntimeHandle<T: PageTree> {
    tx: mpsc::UnboundedSender<PageEvent<T>>,
}

impl<T: PageTree> Clone for RuntimeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: PageTree> RuntimeHandle<T> {
    pub fn post(&self, event: PageEvent<T>) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Disconnected)
    }

    pub fn edit<F>(&self, edit: F) -> Result<(), TransportError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.post(PageEvent::Edit(Box::new(edit)))
    }

    pub fn notify_mutations(&self) -> Result<(), TransportError> {
        self.post(PageEvent::Mutations)
    }

    pub async fn highlight(&self, request: PageRequest) -> Result<HighlightResponse, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.post(PageEvent::Highlight { request, reply })?;
        rx.await.map_err(|_| TransportError::NoResponse)
    }

    pub async fn toggle<P>(&self, control: T::Node, prompt: P) -> Result<ToggleOutcome, TransportError>
    where
        P: TitlePrompt + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.post(PageEvent::Toggle {
            control,
            prompt: Box::new(prompt),
            reply,
        })?;
        rx.await.map_err(|_| TransportError::NoResponse)
    }

    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.post(PageEvent::Shutdown)
    }
}

impl<T> HighlightTransport for RuntimeHandle<T>
where
    T: PageTree + Send + 'static,
    T::Node: Send + Sync,
{
    fn send<'a>(
        &'a self,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<HighlightResponse, TransportError>> {
        self.highlight(request.clone()).boxed()
    }
}

pub struct PageRuntime<T: PageTree> {
    tree: T,
    engine: AnnotationEngine<T::Node>,
    reconciler: HighlightReconciler<T::Node>,
    store: BookmarkStore,
    config: HighlightConfig,
    events_rx: mpsc::UnboundedReceiver<PageEvent<T>>,
    /// Feeds store changes back into the loop without keeping it alive.
    events_tx: mpsc::WeakUnboundedSender<PageEvent<T>>,
}

impl<T> PageRuntime<T>
where
    T: PageTree + Send + 'static,
    T::Node: Send + Sync,
{
    /// Create a runtime and the handle that drives it.
    ///
    /// The loop ends on [`PageEvent::Shutdown`] or once every handle is
    /// dropped.
    pub fn new(tree: T, store: BookmarkStore, config: HighlightConfig) -> (Self, RuntimeHandle<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Self {
            tree,
            engine: AnnotationEngine::new(),
            reconciler: HighlightReconciler::new(config.clone()),
            store,
            config,
            events_rx: rx,
            events_tx: tx.downgrade(),
        };
        (runtime, RuntimeHandle { tx })
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn engine(&self) -> &AnnotationEngine<T::Node> {
        &self.engine
    }

    pub fn reconciler(&self) -> &HighlightReconciler<T::Node> {
        &self.reconciler
    }

    /// Load bookmark state and annotate the whole page.
    pub async fn bootstrap(&mut self) {
        let entries = self.store.list().await;
        tracing::debug!("page runtime starting with {} bookmarks", entries.len());
        self.engine.refresh(&mut self.tree, &entries);

        let body = self.tree.body();
        let annotated = self.engine.scan(&mut self.tree, body);
        // The scan covered everything inserted so far, including our controls
        self.tree.take_added_nodes();
        self.reconciler.on_annotated(&mut self.tree, &annotated, Instant::now());
    }

    pub fn on_store_changed(&mut self, entries: &[BookmarkEntry]) {
        self.engine.refresh(&mut self.tree, entries);
    }

    pub fn on_mutations(&mut self, now: Instant) {
        let added = self.tree.take_added_nodes();
        if added.is_empty() {
            return;
        }
        let annotated = self.engine.handle_mutations(&mut self.tree, &added);
        if !self.reconciler.on_annotated(&mut self.tree, &annotated, now) {
            self.reconciler.retry_pending(&mut self.tree, now);
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.reconciler.tick(&mut self.tree, now);
    }

    pub fn on_highlight(&mut self, request: &PageRequest, now: Instant) -> HighlightResponse {
        let PageRequest::Highlight(payload) = request;
        let ok = match payload.target() {
            Some(target) => self.reconciler.request(&mut self.tree, target, now),
            None => false,
        };
        HighlightResponse { ok }
    }

    pub async fn on_toggle(&mut self, control: T::Node, prompt: &mut dyn TitlePrompt) -> ToggleOutcome {
        self.engine
            .toggle(&mut self.tree, control, &self.store, prompt)
            .await
    }

    async fn handle_event(&mut self, event: PageEvent<T>) {
        match event {
            PageEvent::StoreChanged(entries) => self.on_store_changed(&entries),
            PageEvent::Mutations => self.on_mutations(Instant::now()),
            PageEvent::Edit(edit) => {
                edit(&mut self.tree);
                self.on_mutations(Instant::now());
            }
            PageEvent::Highlight { request, reply } => {
                let response = self.on_highlight(&request, Instant::now());
                let _ = reply.send(response);
            }
            PageEvent::Toggle {
                control,
                mut prompt,
                reply,
            } => {
                let outcome = self.on_toggle(control, prompt.as_mut()).await;
                let _ = reply.send(outcome);
            }
            PageEvent::Shutdown => {}
        }
    }

    /// Run until shutdown, returning the tree.
    pub async fn run(mut self) -> T {
        let feedback = self.events_tx.clone();
        let _subscription = self.store.subscribe(move |entries| {
            if let Some(tx) = feedback.upgrade() {
                let _ = tx.send(PageEvent::StoreChanged(entries));
            }
        });

        self.bootstrap().await;

        let mut ticker = tokio::time::interval(self.config.retry_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.reconciler.next_deadline();
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(PageEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
                _ = ticker.tick() => self.on_tick(Instant::now()),
                _ = sleep_until(deadline) => self.reconciler.expire(&mut self.tree, Instant::now()),
            }
        }

        self.reconciler.cancel();
        tracing::debug!("page runtime stopped");
        self.tree
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{control_of, AcceptDefault};
    use crate::config::RetryPolicy;
    use crate::constants::control::{ACTIVE_CLASS, HIGHLIGHT_CLASS};
    use crate::dom::fixtures::*;
    use crate::dom::Document;
    use crate::messaging::{send_highlight_with_retry, HighlightPayload};
    use crate::models::BookmarkCandidate;
    use crate::storage::StorageAreas;

    const PARIS: &str = "The capital of France is Paris.";

    fn highlight(target: &str) -> PageRequest {
        PageRequest::Highlight(HighlightPayload {
            message_id: Some(target.to_string()),
            ..Default::default()
        })
    }

    fn bookmark(id: &str) -> BookmarkCandidate {
        BookmarkCandidate {
            message_id: Some(id.to_string()),
            snippet: Some(PARIS.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_paints_existing_bookmarks() {
        let store = BookmarkStore::new(StorageAreas::in_memory());
        store.add(bookmark("m1")).await.unwrap();

        let mut doc = document();
        let a = attach_answer(&mut doc, "m1", PARIS);
        let b = attach_answer(&mut doc, "m2", "Berlin");

        let (mut runtime, _handle) = PageRuntime::new(doc, store, HighlightConfig::default());
        runtime.bootstrap().await;

        let doc = runtime.tree();
        assert!(doc.has_class(control_of(doc, a.host).unwrap(), ACTIVE_CLASS));
        assert!(!doc.has_class(control_of(doc, b.host).unwrap(), ACTIVE_CLASS));
        assert!(runtime.engine().is_bookmarked("m1"));
    }

    #[tokio::test]
    async fn test_toggle_then_store_change_from_other_surface() {
        let areas = StorageAreas::in_memory();
        let store = BookmarkStore::new(areas.clone());
        let mut doc = document();
        let a = attach_answer(&mut doc, "m1", PARIS);

        let (mut runtime, _handle) = PageRuntime::new(doc, store, HighlightConfig::default());
        runtime.bootstrap().await;
        let control = control_of(runtime.tree(), a.host).unwrap();

        let outcome = runtime.on_toggle(control, &mut AcceptDefault).await;
        assert!(matches!(outcome, ToggleOutcome::Added(_)));
        assert!(runtime.tree().has_class(control, ACTIVE_CLASS));

        // The panel removes it; the page hears about it through the store
        let panel = BookmarkStore::new(areas);
        panel.remove("m1").await.unwrap();
        let entries = panel.list().await;
        runtime.on_store_changed(&entries);
        assert!(!runtime.tree().has_class(control, ACTIVE_CLASS));
    }

    #[tokio::test]
    async fn test_run_highlights_and_shuts_down() {
        let store = BookmarkStore::new(StorageAreas::in_memory());
        let (runtime, handle) = PageRuntime::new(document(), store, HighlightConfig::default());
        let task = tokio::spawn(runtime.run());

        handle
            .edit(|doc: &mut Document| {
                attach_answer(doc, "m1", PARIS);
            })
            .unwrap();
        let response = handle.highlight(highlight("m1")).await.unwrap();
        assert!(response.ok);

        handle.shutdown().unwrap();
        let doc = task.await.unwrap();
        let turn = doc
            .query_first(doc.body(), |t, n| t.has_class(n, HIGHLIGHT_CLASS))
            .unwrap();
        assert_eq!(doc.scroll_history(), &[turn]);
    }

    #[tokio::test]
    async fn test_pending_highlight_resolved_by_mutation() {
        let store = BookmarkStore::new(StorageAreas::in_memory());
        let (runtime, handle) = PageRuntime::new(document(), store, HighlightConfig::default());
        let task = tokio::spawn(runtime.run());

        let response = handle.highlight(highlight("m2")).await.unwrap();
        assert!(!response.ok);

        handle
            .edit(|doc: &mut Document| {
                attach_answer(doc, "m2", "Late answer");
            })
            .unwrap();
        handle.shutdown().unwrap();

        let doc = task.await.unwrap();
        assert_eq!(doc.scroll_history().len(), 1);
        assert!(doc.has_class(doc.scroll_history()[0], HIGHLIGHT_CLASS));
    }

    #[tokio::test]
    async fn test_run_follows_store_changes() {
        let areas = StorageAreas::in_memory();
        let panel = BookmarkStore::new(areas.clone());
        let mut doc = document();
        let a = attach_answer(&mut doc, "m1", PARIS);

        let (runtime, handle) =
            PageRuntime::new(doc, BookmarkStore::new(areas), HighlightConfig::default());
        let task = tokio::spawn(runtime.run());
        // Round trip so the loop is subscribed before the panel writes
        handle.highlight(highlight("m1")).await.unwrap();

        panel.add(bookmark("m1")).await.unwrap();
        handle.shutdown().unwrap();

        let doc = task.await.unwrap();
        assert!(doc.has_class(control_of(&doc, a.host).unwrap(), ACTIVE_CLASS));
    }

    #[tokio::test]
    async fn test_dropping_handles_ends_loop() {
        let store = BookmarkStore::new(StorageAreas::in_memory());
        let (runtime, handle) = PageRuntime::new(document(), store, HighlightConfig::default());
        let task = tokio::spawn(runtime.run());
        drop(handle);
        let doc = task.await.unwrap();
        assert!(doc.scroll_history().is_empty());
    }

    #[tokio::test]
    async fn test_handle_as_highlight_transport() {
        let store = BookmarkStore::new(StorageAreas::in_memory());
        let mut doc = document();
        attach_answer(&mut doc, "m1", PARIS);
        let (runtime, handle) = PageRuntime::new(doc, store, HighlightConfig::default());
        let task = tokio::spawn(runtime.run());

        let policy = RetryPolicy {
            attempts: 2,
            delay_ms: 1,
        };
        assert!(send_highlight_with_retry(&handle, &highlight("m1"), &policy).await);

        handle.shutdown().unwrap();
        task.await.unwrap();
        assert!(!send_highlight_with_retry(&handle, &highlight("m1"), &policy).await);
    }
}
