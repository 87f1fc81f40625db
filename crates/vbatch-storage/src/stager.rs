//! Scoped staging of local files in object storage.
//!
//! Remote analysis services read large inputs from a bucket. A
//! [`StagedObject`] owns the uploaded object: releasing it deletes the
//! object, and dropping it unreleased schedules the delete on the runtime.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// A bucket that can hold temporary copies of local files.
#[async_trait]
pub trait ObjectStager: Send + Sync {
    /// Upload `path` under `key`, returning a URI the remote service can read.
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Handle to an uploaded object. The object is deleted when the handle is
/// released or dropped.
pub struct StagedObject {
    stager: Arc<dyn ObjectStager>,
    key: String,
    uri: String,
    released: bool,
}

impl StagedObject {
    /// Upload `path` and take ownership of the resulting object.
    pub async fn stage(
        stager: Arc<dyn ObjectStager>,
        path: &Path,
        key: impl Into<String>,
    ) -> StorageResult<Self> {
        let key = key.into();
        let uri = stager.upload(path, &key).await?;
        debug!(backend = stager.backend(), key = %key, "Staged object");
        Ok(Self {
            stager,
            key,
            uri,
            released: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Delete the object now. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match self.stager.delete(&self.key).await {
            Ok(()) => debug!(backend = self.stager.backend(), key = %self.key, "Released staged object"),
            Err(e) => warn!(
                backend = self.stager.backend(),
                key = %self.key,
                "Failed to delete staged object: {}",
                e
            ),
        }
    }
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let stager = Arc::clone(&self.stager);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = stager.delete(&key).await {
                        warn!(backend = stager.backend(), key = %key, "Failed to delete staged object: {}", e);
                    }
                });
            }
            Err(_) => warn!(key = %key, "No runtime available, staged object left behind"),
        }
    }
}

/// Stage `path`, run `op` with the object's URI, then release the object
/// whatever `op` returned.
pub async fn with_staged_object<F, Fut, T, E>(
    stager: Arc<dyn ObjectStager>,
    path: &Path,
    key: impl Into<String>,
    op: F,
) -> Result<T, E>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StorageError>,
{
    let staged = StagedObject::stage(stager, path, key).await?;
    let result = op(staged.uri().to_string()).await;
    staged.release().await;
    result
}

/// Content type for a staged file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingStager {
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl ObjectStager for RecordingStager {
        async fn upload(&self, _path: &Path, key: &str) -> StorageResult<String> {
            self.uploads.lock().unwrap().push(key.to_string());
            Ok(format!("mem://bucket/{key}"))
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.deletes.lock().unwrap().push(key.to_string());
            if self.fail_delete {
                Err(StorageError::delete_failed("denied"))
            } else {
                Ok(())
            }
        }

        fn backend(&self) -> &'static str {
            "memory"
        }
    }

    #[derive(Debug, PartialEq)]
    enum OpError {
        Storage(String),
        Remote,
    }

    impl From<StorageError> for OpError {
        fn from(e: StorageError) -> Self {
            OpError::Storage(e.to_string())
        }
    }

    #[tokio::test]
    async fn test_released_on_success() {
        let stager = Arc::new(RecordingStager::default());
        let result: Result<String, OpError> =
            with_staged_object(stager.clone(), Path::new("a.mp4"), "k1", |uri| async move { Ok(uri) }).await;

        assert_eq!(result.unwrap(), "mem://bucket/k1");
        assert_eq!(*stager.deletes.lock().unwrap(), vec!["k1"]);
    }

    #[tokio::test]
    async fn test_released_on_error() {
        let stager = Arc::new(RecordingStager::default());
        let result: Result<(), OpError> =
            with_staged_object(stager.clone(), Path::new("a.mp4"), "k2", |_| async { Err(OpError::Remote) }).await;

        assert_eq!(result, Err(OpError::Remote));
        assert_eq!(*stager.deletes.lock().unwrap(), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_delete_failure_not_propagated() {
        let stager = Arc::new(RecordingStager {
            fail_delete: true,
            ..Default::default()
        });
        let result: Result<u8, OpError> =
            with_staged_object(stager.clone(), Path::new("a.mp4"), "k3", |_| async { Ok(1) }).await;

        assert_eq!(result, Ok(1));
        assert_eq!(stager.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_released_when_cancelled() {
        let stager = Arc::new(RecordingStager::default());
        let task_stager: Arc<dyn ObjectStager> = stager.clone();

        let task = tokio::spawn(async move {
            let _: Result<(), OpError> = with_staged_object(task_stager, Path::new("a.mp4"), "k4", |_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        });

        while stager.uploads.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        task.abort();
        let _ = task.await;

        for _ in 0..50 {
            if !stager.deletes.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*stager.deletes.lock().unwrap(), vec!["k4"]);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for(Path::new("x.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("x.bin")), "application/octet-stream");
    }
}
