//! Keyed stores backing the bookmark engine.
//!
//! Two areas exist: a small replicated area holding the bookmark list and a
//! large device-local area holding overflow content. Callers depend only on
//! [`KeyedStore`]; [`StorageAreas::resolve`] picks concrete stores and falls
//! back to [`NullStore`] when an area is absent.

mod file;
mod memory;
mod null;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use null::NullStore;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreArea {
    /// Small quota, synchronized across devices.
    Replicated,
    /// Large quota, this device only.
    Local,
}

impl fmt::Display for StoreArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreArea::Replicated => write!(f, "replicated"),
            StoreArea::Local => write!(f, "local"),
        }
    }
}

/// A value written to or removed from a store.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub area: StoreArea,
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<Value>,
}

pub type ChangeListener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// Whole-value get/set/remove over string keys.
///
/// There is no compare-and-swap: concurrent read-modify-write cycles on the
/// same key are last-writer-wins.
pub trait KeyedStore: Send + Sync {
    fn area(&self) -> StoreArea;

    /// False for the null store standing in for an absent backend.
    fn is_available(&self) -> bool {
        true
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>>;

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Observe every change made through this store (or another handle to the
    /// same backing data).
    fn watch(&self, listener: ChangeListener) -> Subscription;
}

type ListenerSlots = Mutex<Vec<(u64, ChangeListener)>>;

/// Listener registry shared by the concrete stores.
#[derive(Default)]
pub struct ChangeHub {
    listeners: Arc<ListenerSlots>,
    next_id: AtomicU64,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, listener: ChangeListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        Subscription {
            slots: Arc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn notify(&self, change: &StoreChange) {
        // Snapshot first so a listener may subscribe or unsubscribe re-entrantly
        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registration handle returned by `watch`/`subscribe`.
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    slots: Weak<ListenerSlots>,
    id: u64,
}

impl Subscription {
    /// A handle that was never registered (used by the null store).
    pub fn detached() -> Self {
        Self {
            slots: Weak::new(),
            id: 0,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// The replicated and local stores the engine runs on.
#[derive(Clone)]
pub struct StorageAreas {
    pub replicated: Arc<dyn KeyedStore>,
    pub local: Arc<dyn KeyedStore>,
}

impl StorageAreas {
    /// Pick stores for whichever backends exist.
    ///
    /// Without a replicated backend the list lives in the local one; without
    /// either, the null store makes reads empty and writes no-ops.
    pub fn resolve(
        replicated: Option<Arc<dyn KeyedStore>>,
        local: Option<Arc<dyn KeyedStore>>,
    ) -> Self {
        let local_store: Arc<dyn KeyedStore> = match &local {
            Some(store) => store.clone(),
            None => {
                tracing::warn!("local storage unavailable, overflow content disabled");
                Arc::new(NullStore::new(StoreArea::Local))
            }
        };
        let replicated_store: Arc<dyn KeyedStore> = match (replicated, local) {
            (Some(store), _) => store,
            (None, Some(store)) => {
                tracing::warn!("replicated storage unavailable, keeping bookmarks locally");
                store
            }
            (None, None) => {
                tracing::warn!("no storage available, bookmarks will not persist");
                Arc::new(NullStore::new(StoreArea::Replicated))
            }
        };
        Self {
            replicated: replicated_store,
            local: local_store,
        }
    }

    /// Two independent in-memory stores.
    pub fn in_memory() -> Self {
        Self::resolve(
            Some(Arc::new(MemoryStore::new(StoreArea::Replicated))),
            Some(Arc::new(MemoryStore::new(StoreArea::Local))),
        )
    }

    /// File-backed stores under `data_dir` (`replicated.json`, `local.json`).
    pub fn open_dir(data_dir: &Path) -> Result<Self> {
        let replicated = FileStore::open(StoreArea::Replicated, data_dir.join("replicated.json"))?;
        let local = FileStore::open(StoreArea::Local, data_dir.join("local.json"))?;
        Ok(Self::resolve(Some(Arc::new(replicated)), Some(Arc::new(local))))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store double with injectable failures.

    use std::sync::atomic::AtomicBool;

    use futures::FutureExt;

    use super::*;
    use crate::error::BookmarkError;

    pub struct FailingStore {
        inner: MemoryStore,
        pub fail_reads: AtomicBool,
        pub fail_writes: AtomicBool,
        pub fail_removes: AtomicBool,
    }

    impl FailingStore {
        pub fn new(area: StoreArea) -> Self {
            Self {
                inner: MemoryStore::new(area),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                fail_removes: AtomicBool::new(false),
            }
        }

        pub fn set_fail_reads(&self, on: bool) {
            self.fail_reads.store(on, Ordering::SeqCst);
        }

        pub fn set_fail_writes(&self, on: bool) {
            self.fail_writes.store(on, Ordering::SeqCst);
        }

        pub fn set_fail_removes(&self, on: bool) {
            self.fail_removes.store(on, Ordering::SeqCst);
        }

        pub fn contains(&self, key: &str) -> bool {
            self.inner.snapshot(key).is_some()
        }
    }

    impl KeyedStore for FailingStore {
        fn area(&self) -> StoreArea {
            self.inner.area()
        }

        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                let err = BookmarkError::read_failed(self.area(), "injected read failure");
                return async move { Err(err) }.boxed();
            }
            self.inner.get(key)
        }

        fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
            if self.fail_writes.load(Ordering::SeqCst) {
                let err = BookmarkError::write_failed(self.area(), "QUOTA_BYTES quota exceeded");
                return async move { Err(err) }.boxed();
            }
            self.inner.set(key, value)
        }

        fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
            if self.fail_removes.load(Ordering::SeqCst) {
                let err = BookmarkError::write_failed(self.area(), "injected remove failure");
                return async move { Err(err) }.boxed();
            }
            self.inner.remove(key)
        }

        fn watch(&self, listener: ChangeListener) -> Subscription {
            self.inner.watch(listener)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = hub.watch(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let change = StoreChange {
            area: StoreArea::Local,
            key: "k".to_string(),
            new_value: None,
        };
        hub.notify(&change);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert_eq!(hub.listener_count(), 0);
        hub.notify(&change);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolve_falls_back() {
        let local: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new(StoreArea::Local));
        let areas = StorageAreas::resolve(None, Some(local));
        assert!(areas.replicated.is_available());
        assert_eq!(areas.replicated.area(), StoreArea::Local);

        let areas = StorageAreas::resolve(None, None);
        assert!(!areas.replicated.is_available());
        assert!(!areas.local.is_available());
        assert_eq!(areas.replicated.area(), StoreArea::Replicated);
    }
}
