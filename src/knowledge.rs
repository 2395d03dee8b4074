//! Knowledge snippets for prompt enrichment.
//!
//! [`KnowledgeBase`] loads `.md`/`.txt` manuals once and ranks their
//! paragraphs by query-term overlap.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::ConfigError;

/// Paragraphs this short carry no useful context.
const MIN_SNIPPET_CHARS: usize = 50;

/// Supplies reference snippets relevant to a message.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Up to `top_k` snippets, best first. Empty when nothing matches.
    async fn query(&self, text: &str, top_k: usize) -> Vec<String>;
}

/// Provider that never returns context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn query(&self, _text: &str, _top_k: usize) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory paragraph index over a directory of manuals.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    snippets: Vec<String>,
}

impl KnowledgeBase {
    pub fn from_snippets(snippets: impl IntoIterator<Item = String>) -> Self {
        Self {
            snippets: snippets
                .into_iter()
                .filter(|s| s.chars().count() > MIN_SNIPPET_CHARS)
                .collect(),
        }
    }

    /// Recursively load every `.md` and `.txt` file under `dir`.
    pub async fn load(dir: &Path) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        collect_files(dir.to_path_buf(), &mut files).await?;
        files.sort();

        let mut snippets = Vec::new();
        for path in files {
            let content = fs::read_to_string(&path).await?;
            snippets.extend(split_paragraphs(&content));
        }
        let kb = Self::from_snippets(snippets);
        tracing::info!(dir = %dir.display(), snippets = kb.len(), "Knowledge base loaded");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    fn search(&self, text: &str, top_k: usize) -> Vec<String> {
        let terms = query_terms(text);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, usize)> = self
            .snippets
            .iter()
            .enumerate()
            .filter_map(|(i, snippet)| {
                let lower = snippet.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                (matched > 0).then(|| (matched as f32 / terms.len() as f32, i))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, i)| self.snippets[i].clone())
            .collect()
    }
}

#[async_trait]
impl ContextProvider for KnowledgeBase {
    async fn query(&self, text: &str, top_k: usize) -> Vec<String> {
        self.search(text, top_k)
    }
}

fn collect_files(
    dir: PathBuf,
    out: &mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ConfigError>> + Send + '_>> {
    Box::pin(async move {
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                if !entry.file_name().to_string_lossy().starts_with('.') {
                    collect_files(path, out).await?;
                }
            } else if matches!(path.extension().and_then(|e| e.to_str()), Some("md" | "txt")) {
                out.push(path);
            }
        }
        Ok(())
    })
}

fn split_paragraphs(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Lower-cased words of 4+ letters. Placeholder tokens are skipped.
fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '<' && c != '>' && c != '_')
        .filter(|w| !w.starts_with('<') && w.chars().count() >= 4)
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}
