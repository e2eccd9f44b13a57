pub mod bookmark;

pub use bookmark::{
    decode_list, now_millis, sort_newest_first, BookmarkCandidate, BookmarkEntry, BookmarkPatch,
    ContentBlob,
};
