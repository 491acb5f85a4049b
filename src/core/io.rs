use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Filesystem seam used by every stage that persists artifacts.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &Path) -> Result<bool>;
    /// Entries directly under `dir`, unsorted. A missing directory is an error.
    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    async fn read_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).with_context(|| format!("{:?} is not valid UTF-8", path))
    }

    async fn write_string(&self, path: &Path, content: &str) -> Result<()> {
        self.write(path, content.as_bytes()).await
    }
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to list {:?}", dir))?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let path = dir.path().join("a").join("b").join("file.txt");

        storage.write_string(&path, "olá").await?;
        assert!(storage.exists(&path).await?);
        assert_eq!(storage.read_string(&path).await?, "olá");

        let listed = storage.list(&dir.path().join("a")).await?;
        assert_eq!(listed, vec![dir.path().join("a").join("b")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = NativeStorage::new();
        assert!(storage.list(&dir.path().join("missing")).await.is_err());
    }
}
