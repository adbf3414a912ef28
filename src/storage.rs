//! Key-value persistence port and its file and in-memory backends.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Key holding the JSON-serialized conversation list
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Key holding the selected conversation id
pub const CURRENT_CONVERSATION_KEY: &str = "currentConversationId";

/// String key-value storage the conversation store persists through.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create session directory")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_directory()?;

        // Write beside the target then rename so a crash never leaves half a file.
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp_path, value)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

/// In-memory store. Clones share the same map, so a test can keep a handle
/// and inspect what the conversation store wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_store_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("session"));
        assert_eq!(store.get(CONVERSATIONS_KEY).unwrap(), None);
    }

    #[test]
    fn file_store_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("session"));

        store.set(CURRENT_CONVERSATION_KEY, "\"abc\"").unwrap();
        assert_eq!(
            store.get(CURRENT_CONVERSATION_KEY).unwrap().as_deref(),
            Some("\"abc\"")
        );

        store.set(CURRENT_CONVERSATION_KEY, "\"def\"").unwrap();
        assert_eq!(
            store.get(CURRENT_CONVERSATION_KEY).unwrap().as_deref(),
            Some("\"def\"")
        );

        store.remove(CURRENT_CONVERSATION_KEY).unwrap();
        assert_eq!(store.get(CURRENT_CONVERSATION_KEY).unwrap(), None);
        // removing twice is fine
        store.remove(CURRENT_CONVERSATION_KEY).unwrap();
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session");
        let store = FileStore::new(&session);
        store.set(CONVERSATIONS_KEY, "[]").unwrap();

        let names: Vec<String> = fs::read_dir(&session)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["conversations.json".to_string()]);
    }

    #[test]
    fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.set(CONVERSATIONS_KEY, "[]").unwrap();
        assert_eq!(handle.get(CONVERSATIONS_KEY).unwrap().as_deref(), Some("[]"));
    }
}
