use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::core::error::{StoryError, StoryErrorKind};
use crate::core::io::Storage;
use crate::services::images::ImageApi;
use crate::utils::retry::{retry_with_fixed_delay, RetryPolicy};

/// Base path that result files are derived from: `{stem}_grid_{n}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTarget {
    pub folder: PathBuf,
    pub stem: String,
    pub extension: String,
}

impl ImageTarget {
    pub fn from_path(path: &Path) -> Self {
        Self {
            folder: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            stem: path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string()),
            extension: path
                .extension()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "png".to_string()),
        }
    }

    /// Path of the `index`-th (0-based) result.
    pub fn grid_path(&self, index: usize) -> PathBuf {
        self.folder
            .join(format!("{}_grid_{}.{}", self.stem, index + 1, self.extension))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub url: String,
    pub path: PathBuf,
}

pub struct ResultFetcher<'a> {
    api: &'a dyn ImageApi,
    storage: &'a dyn Storage,
    policy: RetryPolicy,
}

impl<'a> ResultFetcher<'a> {
    pub fn new(api: &'a dyn ImageApi, storage: &'a dyn Storage, policy: RetryPolicy) -> Self {
        Self {
            api,
            storage,
            policy,
        }
    }

    /// Downloads every URL independently. A URL that keeps failing is logged
    /// and skipped; the others are still saved.
    pub async fn fetch_all(&self, urls: &[String], target: &ImageTarget) -> Vec<SavedImage> {
        let mut saved = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let path = target.grid_path(i);
            match self.fetch_one(url, &path).await {
                Ok(image) => {
                    info!("Image saved: {}", image.path.display());
                    saved.push(image);
                }
                Err(e) => warn!("Grid image {} skipped: {}", path.display(), e),
            }
        }
        saved
    }

    async fn fetch_one(&self, url: &str, path: &Path) -> Result<SavedImage, StoryError> {
        let api = self.api;
        let label = format!("Download {}", url);
        let bytes = retry_with_fixed_delay(&self.policy, &label, |_| true, move |_| async move {
            match api.download(url).await {
                Ok(bytes) if bytes.is_empty() => Err("empty body".to_string()),
                Ok(bytes) => Ok(bytes),
                Err(e) => Err(format!("{:#}", e)),
            }
        })
        .await
        .map_err(|failure| {
            StoryError::new(StoryErrorKind::DownloadFailed {
                url: url.to_string(),
                attempts: failure.attempts,
                detail: failure.last_error,
            })
        })?;

        self.storage.write(path, &bytes).await.map_err(|e| {
            StoryError::new(StoryErrorKind::DownloadFailed {
                url: url.to_string(),
                attempts: 1,
                detail: format!("could not write {}: {:#}", path.display(), e),
            })
        })?;

        Ok(SavedImage {
            url: url.to_string(),
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::services::images::tests::MockImageApi;
    use anyhow::anyhow;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_grid_paths() {
        let target = ImageTarget::from_path(Path::new("out/IMAGENS/carta_personagem_Maria_prompt1.png"));
        assert_eq!(target.stem, "carta_personagem_Maria_prompt1");
        assert_eq!(
            target.grid_path(0),
            PathBuf::from("out/IMAGENS/carta_personagem_Maria_prompt1_grid_1.png")
        );
        assert_eq!(
            target.grid_path(3),
            PathBuf::from("out/IMAGENS/carta_personagem_Maria_prompt1_grid_4.png")
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let api = MockImageApi {
            downloads: Mutex::new(HashMap::from([(
                "https://cdn/a.png".to_string(),
                VecDeque::from(vec![Err(anyhow!("503")), Ok(Vec::new()), Ok(b"PNG".to_vec())]),
            )])),
            ..Default::default()
        };
        let fetcher = ResultFetcher::new(&api, &storage, RetryPolicy::with_delay(3, Duration::ZERO));
        let target = ImageTarget::from_path(&dir.path().join("img.png"));

        let saved = fetcher
            .fetch_all(&["https://cdn/a.png".to_string()], &target)
            .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(std::fs::read(&saved[0].path)?, b"PNG");
        assert_eq!(api.download_calls.lock().unwrap().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_url_does_not_block_siblings() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let api = MockImageApi {
            downloads: Mutex::new(HashMap::from([(
                "https://cdn/a.png".to_string(),
                VecDeque::from(vec![
                    Err(anyhow!("403")),
                    Err(anyhow!("403")),
                    Err(anyhow!("403")),
                ]),
            )])),
            ..Default::default()
        };
        let fetcher = ResultFetcher::new(&api, &storage, RetryPolicy::with_delay(3, Duration::ZERO));
        let target = ImageTarget::from_path(&dir.path().join("img.png"));

        let saved = fetcher
            .fetch_all(
                &["https://cdn/a.png".to_string(), "https://cdn/b.png".to_string()],
                &target,
            )
            .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].path, dir.path().join("img_grid_2.png"));
        assert!(!dir.path().join("img_grid_1.png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_download_keeps_last_cause() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let api = MockImageApi {
            downloads: Mutex::new(HashMap::from([(
                "https://cdn/a.png".to_string(),
                VecDeque::from(vec![Err(anyhow!("503 busy")), Ok(Vec::new())]),
            )])),
            ..Default::default()
        };
        let fetcher = ResultFetcher::new(&api, &storage, RetryPolicy::with_delay(2, Duration::ZERO));

        let err = fetcher
            .fetch_one("https://cdn/a.png", &dir.path().join("img_grid_1.png"))
            .await
            .unwrap_err();
        match err.kind() {
            StoryErrorKind::DownloadFailed { attempts, detail, .. } => {
                assert_eq!(*attempts, 2);
                assert_eq!(detail, "empty body");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().contains("empty body"));
        Ok(())
    }
}
