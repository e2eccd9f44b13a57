use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::{ChangeListener, KeyedStore, StoreArea, Subscription};
use crate::error::Result;

/// Stand-in for an absent backend: reads are empty, writes vanish.
pub struct NullStore {
    area: StoreArea,
}

impl NullStore {
    pub fn new(area: StoreArea) -> Self {
        Self { area }
    }
}

impl KeyedStore for NullStore {
    fn area(&self) -> StoreArea {
        self.area
    }

    fn is_available(&self) -> bool {
        false
    }

    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        async { Ok(None) }.boxed()
    }

    fn set<'a>(&'a self, _key: &'a str, _value: Value) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn remove<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn watch(&self, _listener: ChangeListener) -> Subscription {
        Subscription::detached()
    }
}
