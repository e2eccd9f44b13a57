//! JSON-file store.
//!
//! The whole area is one JSON object on disk. Every operation re-reads the
//! file so writes made by another process (another surface) are visible, and
//! every write goes through a temp file plus rename so a crash mid-write
//! leaves the previous contents intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{ChangeHub, ChangeListener, KeyedStore, StoreArea, StoreChange, Subscription};
use crate::error::{BookmarkError, Result};

pub struct FileStore {
    area: StoreArea,
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
    hub: ChangeHub,
}

impl FileStore {
    /// Open (without creating) the store file at `path`, creating its parent
    /// directory.
    pub fn open(area: StoreArea, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                tracing::warn!("cannot create {}: {}", parent.display(), e);
                BookmarkError::StorageUnavailable(area)
            })?;
        }
        Ok(Self {
            area,
            path,
            write_lock: Mutex::new(()),
            hub: ChangeHub::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            // Nothing written yet
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(BookmarkError::read_failed(self.area, e.to_string())),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BookmarkError::read_failed(
                self.area,
                format!("{} does not hold a JSON object", self.path.display()),
            )),
            Err(e) => Err(BookmarkError::read_failed(self.area, e.to_string())),
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json).map_err(|e| BookmarkError::write_failed(self.area, e.to_string()))?;
        fs::rename(&temp, &self.path)
            .map_err(|e| BookmarkError::write_failed(self.area, e.to_string()))?;
        Ok(())
    }
}

impl KeyedStore for FileStore {
    fn area(&self) -> StoreArea {
        self.area
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        async move { Ok(self.load()?.get(key).cloned()) }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            {
                let _guard = self.write_lock.lock();
                // An unreadable file must not be silently overwritten
                let mut map = self
                    .load()
                    .map_err(|e| BookmarkError::write_failed(self.area, e.to_string()))?;
                map.insert(key.to_string(), value.clone());
                self.save(&map)?;
            }
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
            let removed = {
                let _guard = self.write_lock.lock();
                let mut map = self
                    .load()
                    .map_err(|e| BookmarkError::write_failed(self.area, e.to_string()))?;
                let removed = map.remove(key).is_some();
                if removed {
                    self.save(&map)?;
                }
                removed
            };
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
