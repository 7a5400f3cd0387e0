//! Concurrent directory-to-bucket synchronization.
//!
//! ## `upload_directory`: 4-step protocol
//!
//! 1. Clear the destination prefix (directory replace, not merge).
//! 2. Enumerate every regular file below the local root.
//! 3. Queue all files on a pre-sized, closed channel drained by a fixed pool
//!    of workers sharing one [`BucketHandle`].
//! 4. The first failure is stored in a single-assignment cell and cancels the
//!    shared token; once every worker has joined, that error is returned.
//!
//! Each worker buffers one whole file before its put, so peak memory is
//! bounded by the `workers` largest files in the tree. [`ObjectStore`]
//! takes an owned body; streaming would need a body type on that trait.
//!
//! [`ObjectStore`]: crate::store::ObjectStore

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::content_type::{self, SNIFF_LEN};
use crate::error::{io_err, StaticsError};
use crate::paths;
use crate::store::BucketHandle;

/// Default size of the upload worker pool.
pub const DEFAULT_WORKERS: usize = 5;

/// A file waiting in the upload queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    pub path: PathBuf,
    /// Path relative to the local root; becomes the key suffix.
    pub relative: PathBuf,
}

/// Outcome of a successful directory upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadSummary {
    /// Objects removed from the destination before uploading.
    pub cleared: usize,
    pub uploaded: usize,
}

/// Uploads local trees into bucket prefixes.
#[derive(Debug, Clone)]
pub struct AssetSynchronizer {
    handle: BucketHandle,
    workers: usize,
}

impl AssetSynchronizer {
    pub fn new(handle: BucketHandle, workers: usize) -> Self {
        Self {
            handle,
            workers: workers.max(1),
        }
    }

    pub fn handle(&self) -> &BucketHandle {
        &self.handle
    }

    /// Replace everything under `dest` with the files below `local_root`.
    pub async fn upload_directory(
        &self,
        dest: &str,
        local_root: &Path,
    ) -> Result<UploadSummary, StaticsError> {
        self.upload_directory_until(dest, local_root, &CancellationToken::new())
            .await
    }

    /// [`upload_directory`](Self::upload_directory) that also stops when
    /// `cancel` fires.
    pub async fn upload_directory_until(
        &self,
        dest: &str,
        local_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<UploadSummary, StaticsError> {
        // Step 1: clear the destination.
        let cleared = self.delete_directory(dest).await?;

        // Step 2: enumerate local files.
        let files = collect_files(local_root)?;
        let total = files.len();
        tracing::info!(dest, files = total, workers = self.workers, "uploading static directory");
        if total == 0 {
            return Ok(UploadSummary {
                cleared,
                uploaded: 0,
            });
        }

        // Step 3: pre-sized queue, closed before the workers start.
        let (tx, rx) = mpsc::channel::<QueuedFile>(total);
        for file in files {
            tx.send(file).await.map_err(|_| StaticsError::Cancelled)?;
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let token = cancel.child_token();
        let first_error: Arc<OnceLock<StaticsError>> = Arc::new(OnceLock::new());
        let uploaded = Arc::new(AtomicUsize::new(0));

        let mut pool = JoinSet::new();
        for worker in 0..self.workers.min(total) {
            let handle = self.handle.clone();
            let dest = dest.to_string();
            let queue = Arc::clone(&queue);
            let token = token.clone();
            let first_error = Arc::clone(&first_error);
            let uploaded = Arc::clone(&uploaded);

            pool.spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        next = async { queue.lock().await.recv().await } => next,
                    };
                    let Some(file) = next else { break };

                    let result = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        result = upload_file(&handle, &dest, &file) => result,
                    };
                    match result {
                        Ok(()) => {
                            uploaded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            tracing::debug!(worker, file = %file.path.display(), error = %err, "upload failed");
                            let _ = first_error.set(err);
                            token.cancel();
                            break;
                        }
                    }
                }
            });
        }

        // Step 4: join everything, then surface the first error.
        while let Some(joined) = pool.join_next().await {
            if let Err(join_err) = joined {
                let _ = first_error.set(StaticsError::PushPanicked(join_err.to_string()));
                token.cancel();
            }
        }

        let first_error = Arc::into_inner(first_error).and_then(OnceLock::into_inner);
        if let Some(err) = first_error {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(StaticsError::Cancelled);
        }

        let uploaded = uploaded.load(Ordering::Relaxed);
        tracing::debug!(dest, uploaded, cleared, "static directory uploaded");
        Ok(UploadSummary { cleared, uploaded })
    }

    /// Delete every object under the directory `dir`; returns how many.
    pub async fn delete_directory(&self, dir: &str) -> Result<usize, StaticsError> {
        let prefix = paths::directory_prefix(dir);
        let page = self.handle.list(&prefix, None).await?;
        let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
        if !keys.is_empty() {
            tracing::debug!(prefix = %prefix, objects = keys.len(), "deleting directory");
            self.handle.delete(&keys).await?;
        }
        Ok(keys.len())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Every regular file below `root`, in a stable order.
fn collect_files(root: &Path) -> Result<Vec<QueuedFile>, StaticsError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| StaticsError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push(QueuedFile {
            path: entry.into_path(),
            relative,
        });
    }
    Ok(files)
}

async fn upload_file(
    handle: &BucketHandle,
    dest: &str,
    file: &QueuedFile,
) -> Result<(), StaticsError> {
    let mut reader = tokio::fs::File::open(&file.path)
        .await
        .map_err(|e| io_err(&file.path, e))?;

    let content_type = match content_type::from_extension(&file.path) {
        Some(ct) => ct,
        None => {
            let mut head = Vec::with_capacity(SNIFF_LEN);
            (&mut reader)
                .take(SNIFF_LEN as u64)
                .read_to_end(&mut head)
                .await
                .map_err(|e| io_err(&file.path, e))?;
            reader
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| io_err(&file.path, e))?;
            content_type::sniff(&head).to_string()
        }
    };

    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .await
        .map_err(|e| io_err(&file.path, e))?;

    let key = paths::object_key(dest, &file.relative);
    tracing::debug!(key = %key, content_type = %content_type, "uploading");
    handle.put(&key, body, &content_type).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn collect_files_skips_directories() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), "c").unwrap();
        fs::write(dir.path().join("root.txt"), "r").unwrap();

        let files = collect_files(dir.path()).expect("collect");
        let relative: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            relative,
            vec![PathBuf::from("a/b/c.txt"), PathBuf::from("root.txt")]
        );
    }

    #[test]
    fn missing_root_is_a_walk_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = collect_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StaticsError::Walk { .. }));
    }
}
