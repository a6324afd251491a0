use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::models::Role;

/// Prompt files keyed by their path relative to the prompts directory.
/// Entries live until `clear` is called.
pub struct PromptCache {
    dir: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl PromptCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// `prompt_file` wins over `system_prompt`; an unreadable file falls back
    /// to `system_prompt`.
    pub async fn get_prompt(&self, role: &Role) -> String {
        let inline = role.system_prompt.clone().unwrap_or_default();
        let Some(file) = role.prompt_file.as_deref().filter(|f| !f.trim().is_empty()) else {
            return inline;
        };

        if let Some(cached) = self.entries.read().await.get(file) {
            return cached.clone();
        }

        let path = self.dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!("Cached prompt file {}", path.display());
                let mut entries = self.entries.write().await;
                entries
                    .entry(file.to_string())
                    .or_insert(text)
                    .clone()
            }
            Err(e) => {
                warn!(
                    "Prompt file {} for role {} unreadable ({}), using inline prompt",
                    path.display(),
                    role.code,
                    e
                );
                inline
            }
        }
    }

    /// Drops one file, or everything when `file` is `None`. Returns how many
    /// entries were removed.
    pub async fn clear(&self, file: Option<&str>) -> usize {
        let mut entries = self.entries.write().await;
        let removed = match file {
            Some(f) => usize::from(entries.remove(f).is_some()),
            None => {
                let n = entries.len();
                entries.clear();
                n
            }
        };
        info!("Prompt cache cleared ({} entries)", removed);
        removed
    }

    pub async fn cached_count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn cached_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.entries.read().await.keys().cloned().collect();
        files.sort();
        files
    }
}
