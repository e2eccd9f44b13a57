use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use markback_core::{
    dispatch, router_message, target_url, BookmarkCandidate, BookmarkEntry, BookmarkStore,
    PageRequest,
};
use serde_json::{json, Value};

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List bookmarks, newest first
    List {
        /// One line per bookmark instead of JSON
        #[arg(long)]
        human: bool,
    },

    /// Bookmark an answer
    Add(AddArgs),

    /// Remove a bookmark and its stored content
    Remove {
        /// Bookmark ID
        id: String,
    },

    /// Change a bookmark's title
    Rename {
        /// Bookmark ID
        id: String,
        /// New title (first line, at most 120 characters, is kept)
        title: String,
    },

    /// Print the full answer text stored with a bookmark
    Content {
        /// Bookmark ID
        id: String,
    },

    /// Print the location to open for a bookmark
    Url {
        /// Bookmark ID
        id: String,
        /// Location used when the bookmark has no conversation ids
        #[arg(long, default_value = "")]
        current: String,
    },

    /// Print the message a page runtime expects for highlighting a bookmark
    HighlightRequest {
        /// Bookmark ID
        id: String,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct AddArgs {
    /// Message ID of the answer (becomes the bookmark ID)
    #[arg(long)]
    pub message_id: Option<String>,
    /// Explicit bookmark ID, used when there is no message ID
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub snippet: Option<String>,
    /// Full answer text
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,
    /// Read the full answer text from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,
    #[arg(long)]
    pub conversation_id: Option<String>,
    #[arg(long)]
    pub conversation_title: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long)]
    pub project_title: Option<String>,
    /// Base address, e.g. https://chatgpt.com
    #[arg(long)]
    pub origin: Option<String>,
    #[arg(long)]
    pub url: Option<String>,
}

impl AddArgs {
    fn into_candidate(self) -> Result<BookmarkCandidate> {
        let content = match self.content_file {
            Some(path) => Some(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read content file: {}", path.display()))?,
            ),
            None => self.content,
        };
        Ok(BookmarkCandidate {
            id: self.id,
            message_id: self.message_id,
            conversation_id: self.conversation_id,
            conversation_title: self.conversation_title,
            project_id: self.project_id,
            project_title: self.project_title,
            origin: self.origin,
            title: self.title,
            snippet: self.snippet,
            content,
            url: self.url,
            saved_at: None,
        })
    }
}

/// What a command prints.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Json(Value),
    Text(String),
}

impl Output {
    pub fn render(&self, pretty: bool) -> Result<String> {
        match self {
            Output::Json(value) if pretty => Ok(serde_json::to_string_pretty(value)?),
            Output::Json(value) => Ok(serde_json::to_string(value)?),
            Output::Text(text) => Ok(text.clone()),
        }
    }
}

pub async fn execute(command: Command, store: &BookmarkStore) -> Result<Output> {
    match command {
        Command::List { human } => {
            let data = route(store, "list", Value::Null).await?;
            if !human {
                return Ok(Output::Json(data));
            }
            let entries: Vec<BookmarkEntry> = serde_json::from_value(data)?;
            Ok(Output::Text(format_entries(&entries)))
        }
        Command::Add(args) => {
            let candidate = args.into_candidate()?;
            let payload = serde_json::to_value(candidate)?;
            Ok(Output::Json(route(store, "add", payload).await?))
        }
        Command::Remove { id } => {
            route(store, "remove", json!({ "id": id })).await?;
            Ok(Output::Json(json!({ "removed": id })))
        }
        Command::Rename { id, title } => {
            let updated = route(
                store,
                "update",
                json!({ "id": id, "patch": { "title": title } }),
            )
            .await?;
            if updated.is_null() {
                bail!("No bookmark with id {}", id);
            }
            Ok(Output::Json(updated))
        }
        Command::Content { id } => {
            let blob = store
                .content(&id)
                .await
                .ok_or_else(|| anyhow!("No content stored for {}", id))?;
            Ok(Output::Json(serde_json::to_value(blob)?))
        }
        Command::Url { id, current } => {
            let entry = find(store, &id).await?;
            Ok(Output::Text(target_url(&entry, &current)))
        }
        Command::HighlightRequest { id } => {
            let entry = find(store, &id).await?;
            Ok(Output::Json(serde_json::to_value(
                PageRequest::highlight_entry(&entry),
            )?))
        }
    }
}

/// Send a request through the bookmark router, turning `{ok: false}` into an
/// error.
async fn route(store: &BookmarkStore, kind: &str, payload: Value) -> Result<Value> {
    let response = dispatch(store, &router_message(kind, payload))
        .await
        .ok_or_else(|| anyhow!("Router did not handle {} request", kind))?;
    if !response.ok {
        bail!(
            "{} failed: {}",
            kind,
            response.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(response.data.unwrap_or(Value::Null))
}

async fn find(store: &BookmarkStore, id: &str) -> Result<BookmarkEntry> {
    store
        .list()
        .await
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| anyhow!("No bookmark with id {}", id))
}

fn format_saved_at(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_entries(entries: &[BookmarkEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let group = match &e.project_title {
                Some(project) => format!("{} / {}", project, e.conversation_title),
                None => e.conversation_title.clone(),
            };
            format!("{}  {}  [{}]  {}", format_saved_at(e.saved_at), e.title, group, e.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
