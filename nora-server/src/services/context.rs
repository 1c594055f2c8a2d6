//! Company knowledge folded into the system prompt.
//!
//! Every text-like file under `company_info/`, plus the extracted text of
//! `.docx` and `.pdf` documents, becomes one block:
//!
//! ```text
//! === relative/path.md ===
//! <file contents>
//! ```
//!
//! Blocks are joined by a blank line and cut at `max_chars`. The result is
//! cached for `ttl` and rebuilt lazily after [`ContextCache::invalidate`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::services::company::{CONFIG_FILE, SYSTEM_PROMPT_FILE};
use crate::services::extract::{extract_text, is_document_extension};
use crate::services::files::{extension_of, is_hidden, is_text_extension};

const TRUNCATION_MARKER: &str = "\n[... company context truncated]";

#[derive(Debug)]
pub struct ContextCache {
    dir: PathBuf,
    ttl: Duration,
    max_chars: usize,
    cached: Mutex<Option<(Instant, String)>>,
}

impl ContextCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, max_chars: usize) -> Self {
        Self { dir: dir.into(), ttl, max_chars, cached: Mutex::new(None) }
    }

    /// Cached context, rebuilt when older than the TTL.
    pub async fn get(&self) -> String {
        if let Some(hit) = self.fresh() {
            return hit;
        }
        let dir = self.dir.clone();
        let max_chars = self.max_chars;
        let built = tokio::task::spawn_blocking(move || build_context(&dir, max_chars))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "company context task failed");
                String::new()
            });
        if let Ok(mut slot) = self.cached.lock() {
            *slot = Some((Instant::now(), built.clone()));
        }
        built
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.cached.lock() {
            *slot = None;
        }
    }

    fn fresh(&self) -> Option<String> {
        let slot = self.cached.lock().ok()?;
        let (at, text) = slot.as_ref()?;
        (at.elapsed() < self.ttl).then(|| text.clone())
    }
}

/// Walk `dir` in name order and concatenate every readable text file.
pub fn build_context(dir: &Path, max_chars: usize) -> String {
    let mut blocks = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        if entry.depth() == 1 {
            let name = entry.file_name().to_string_lossy();
            if name == CONFIG_FILE || name == SYSTEM_PROMPT_FILE {
                continue;
            }
        }
        let ext = extension_of(&entry.file_name().to_string_lossy());
        let content = if is_text_extension(&ext) {
            std::fs::read(entry.path())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(anyhow::Error::from)
        } else if is_document_extension(&ext) {
            extract_text(entry.path(), &ext)
        } else {
            continue;
        };
        let content = match content {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable context file");
                continue;
            }
        };
        if content.trim().is_empty() {
            continue;
        }
        let rel = rel.to_string_lossy().replace('\\', "/");
        blocks.push(format!("=== {rel} ===\n{}", content.trim_end()));
    }

    let context = blocks.join("\n\n");
    debug!(files = blocks.len(), chars = context.chars().count(), "company context built");
    truncate_chars(context, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text,
    }
}
