use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ChangeHub, ChangeListener, KeyedStore, StoreArea, StoreChange, Subscription};
use crate::error::Result;

/// Process-local store. Clones of an `Arc<MemoryStore>` share data and
/// listeners, which is how two surfaces see each other's writes in tests.
pub struct MemoryStore {
    area: StoreArea,
    values: Mutex<HashMap<String, Value>>,
    hub: ChangeHub,
}

impl MemoryStore {
    pub fn new(area: StoreArea) -> Self {
        Self {
            area,
            values: Mutex::new(HashMap::new()),
            hub: ChangeHub::new(),
        }
    }

    /// Synchronous read of the current value.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyedStore for MemoryStore {
    fn area(&self) -> StoreArea {
        self.area
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        async move { Ok(self.snapshot(key)) }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            self.values.lock().insert(key.to_string(), value.clone());
            self.hub.notify(&StoreChange {
                area: self.area,
                key: key.to_string(),
                new_value: Some(value),
            });
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let removed = self.values.lock().remove(key).is_some();
            if removed {
                self.hub.notify(&StoreChange {
                    area: self.area,
                    key: key.to_string(),
                    new_value: None,
                });
            }
            Ok(())
        }
        .boxed()
    }

    fn watch(&self, listener: ChangeListener) -> Subscription {
        self.hub.watch(listener)
    }
}
