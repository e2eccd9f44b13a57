mod bookmark_store;

pub use bookmark_store::{content_key, BookmarkStore};
