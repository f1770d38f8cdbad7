//! Small key/value file for client state that must outlive one command.

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context as _;
use tracing::debug;

use crate::{Error, Result};

const FILE_NAME: &str = "state.json";

/// String values stored as one JSON object under the state directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: state_dir.into().join(FILE_NAME),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt state file {}", self.path.display()))
                .map_err(Error::Storage),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::Storage(
                anyhow::Error::new(e).context(format!("failed to read {}", self.path.display())),
            )),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let write = async {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("failed to create state directory")?;
            }
            let bytes = serde_json::to_vec_pretty(values).context("failed to encode state")?;
            tokio::fs::write(&self.path, bytes)
                .await
                .with_context(|| format!("failed to write {}", self.path.display()))
        };
        write.await.map_err(Error::Storage)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.load().await?;
        values.insert(key.to_owned(), value.to_owned());
        debug!(key, "state saved");
        self.save(&values).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            debug!(key, "state removed");
            self.save(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TempDir;

    #[tokio::test]
    async fn set_get_remove() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = LocalStore::new(dir.path().join("nested"));

        assert_eq!(store.get("resetEmail").await?, None);
        store.set("resetEmail", "asha@example.com").await?;
        store.set("other", "x").await?;
        assert_eq!(
            store.get("resetEmail").await?.as_deref(),
            Some("asha@example.com")
        );

        store.remove("resetEmail").await?;
        assert_eq!(store.get("resetEmail").await?, None);
        assert_eq!(store.get("other").await?.as_deref(), Some("x"));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        tokio::fs::write(dir.path().join(FILE_NAME), b"not json").await?;
        let store = LocalStore::new(dir.path());
        assert!(matches!(store.get("k").await, Err(Error::Storage(_))));
        Ok(())
    }
}
