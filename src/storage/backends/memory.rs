use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;

use crate::storage::template::StorageBackend;

#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Bytes>>,
}

#[cfg(test)]
impl MemoryBackend {
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store(&self, name: &str, data: Bytes) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        entries.insert(name.to_string(), data);
        Ok(())
    }

    async fn fetch(&self, name: &str) -> anyhow::Result<Option<Bytes>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        Ok(entries.get(name).cloned())
    }

    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        Ok(entries.contains_key(name))
    }
}
