//! Blob storage backing a chunk server.
//!
//! Blobs live in one flat directory, one file per blob. Writes land in a
//! hidden temporary file and are renamed into place once complete, so a
//! listing never shows a half-written blob.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{ChunkServerError, Result};

/// Readable blob together with its length at open time
pub struct BlobReader {
    pub length: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// An in-progress blob write
#[async_trait::async_trait]
pub trait BlobWriter: Send {
    /// Append a block of payload
    async fn write(&mut self, block: &[u8]) -> Result<()>;

    /// Make the blob visible; returns the number of bytes written
    async fn commit(self: Box<Self>) -> Result<u64>;

    /// Throw the write away, leaving no blob under its name
    async fn abort(self: Box<Self>);
}

/// Trait for blob storage operations
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Names of all complete blobs, sorted
    async fn list(&self) -> Result<Vec<String>>;

    /// Open a blob for reading
    async fn open(&self, name: &str) -> Result<BlobReader>;

    /// Start writing a blob, replacing any existing blob of that name on commit
    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>>;
}

/// File-based blob storage implementation
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    data_dir: PathBuf,
}

impl FileBlobStore {
    /// Open the store, creating the data directory if needed
    pub async fn open_dir<P: Into<PathBuf>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await.map_err(|e| {
            ChunkServerError::Storage(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        info!("Blob directory: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.data_dir.join(name))
    }

    /// Hidden temporary whose length does not depend on the blob name
    fn temp_path(&self) -> PathBuf {
        self.data_dir
            .join(format!(".{}.part", uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait::async_trait]
impl BlobStore for FileBlobStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.data_dir).await.map_err(|e| {
            ChunkServerError::Storage(format!(
                "Failed to read directory {}: {}",
                self.data_dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if !file_type.is_file() {
                continue;
            }
            // Hidden files are temporaries; names that could not travel in a
            // listing line were not put there by us
            match entry.file_name().into_string() {
                Ok(name) if validate_blob_name(&name).is_ok() => names.push(name),
                Ok(name) => debug!("Skipping foreign file {:?}", name),
                Err(raw) => debug!("Skipping non UTF-8 file name {:?}", raw),
            }
        }

        names.sort();
        debug!("Found {} blobs", names.len());
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<BlobReader> {
        let path = self.blob_path(name)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChunkServerError::BlobNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(ChunkServerError::Io(e)),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(ChunkServerError::BlobNotFound {
                name: name.to_string(),
            });
        }

        debug!("Opened blob {} ({} bytes)", name, metadata.len());
        Ok(BlobReader {
            length: metadata.len(),
            reader: Box::new(file),
        })
    }

    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>> {
        let final_path = self.blob_path(name)?;
        let temp_path = self.temp_path();

        let file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;

        debug!("Writing blob {} via {}", name, temp_path.display());
        Ok(Box::new(FileBlobWriter {
            file,
            temp_path,
            final_path,
            written: 0,
        }))
    }
}

struct FileBlobWriter {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

#[async_trait::async_trait]
impl BlobWriter for FileBlobWriter {
    async fn write(&mut self, block: &[u8]) -> Result<()> {
        self.file.write_all(block).await?;
        self.written += block.len() as u64;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<u64> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_all().await?;
            fs::rename(&self.temp_path, &self.final_path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&self.temp_path).await {
                warn!("Failed to remove {}: {}", self.temp_path.display(), cleanup);
            }
            return Err(ChunkServerError::Storage(format!(
                "Failed to commit {}: {}",
                self.final_path.display(),
                e
            )));
        }

        info!("Stored blob {} ({} bytes)", self.final_path.display(), self.written);
        Ok(self.written)
    }

    async fn abort(self: Box<Self>) {
        let FileBlobWriter {
            file,
            temp_path,
            final_path,
            written,
        } = *self;
        drop(file);

        if let Err(e) = fs::remove_file(&temp_path).await {
            warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
        // A failed store invalidates whatever was stored under the name before
        match fs::remove_file(&final_path).await {
            Ok(()) => debug!("Removed stale blob {}", final_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove stale blob {}: {}", final_path.display(), e),
        }

        warn!("Discarded partial blob {} after {} bytes", final_path.display(), written);
    }
}

/// Reject names that would escape the data directory or collide with temporaries
pub fn validate_blob_name(name: &str) -> Result<()> {
    ringfs_common::validate_file_name(name).map_err(|e| ChunkServerError::InvalidBlobName {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn create_test_store() -> (FileBlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open_dir(temp_dir.path().join("dfs1")).await.unwrap();
        (store, temp_dir)
    }

    async fn read_all(store: &FileBlobStore, name: &str) -> Vec<u8> {
        let mut blob = store.open(name).await.unwrap();
        let mut data = Vec::new();
        blob.reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(blob.length, data.len() as u64);
        data
    }

    #[tokio::test]
    async fn test_open_dir_creates_directory() {
        let (store, _temp_dir) = create_test_store().await;
        assert!(store.data_dir().is_dir());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_and_read_blob() {
        let (store, _temp_dir) = create_test_store().await;

        let mut writer = store.create("report.txt.1").await.unwrap();
        writer.write(b"Hello, ").await.unwrap();
        writer.write(b"World!").await.unwrap();
        assert_eq!(writer.commit().await.unwrap(), 13);

        assert_eq!(read_all(&store, "report.txt.1").await, b"Hello, World!");
        assert_eq!(store.list().await.unwrap(), vec!["report.txt.1".to_string()]);
    }

    #[tokio::test]
    async fn test_uncommitted_blob_is_invisible() {
        let (store, _temp_dir) = create_test_store().await;

        let mut writer = store.create("x.2").await.unwrap();
        writer.write(b"partial").await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            store.open("x.2").await,
            Err(ChunkServerError::BlobNotFound { .. })
        ));

        writer.abort().await;
        assert!(store.list().await.unwrap().is_empty());
        let leftovers = std::fs::read_dir(store.data_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_abort_removes_previous_version() {
        let (store, _temp_dir) = create_test_store().await;

        let mut writer = store.create("x.3").await.unwrap();
        writer.write(b"old").await.unwrap();
        writer.commit().await.unwrap();

        let mut writer = store.create("x.3").await.unwrap();
        writer.write(b"ne").await.unwrap();
        writer.abort().await;

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_version() {
        let (store, _temp_dir) = create_test_store().await;

        for content in [&b"first"[..], &b"second"[..]] {
            let mut writer = store.create("x.4").await.unwrap();
            writer.write(content).await.unwrap();
            writer.commit().await.unwrap();
        }

        assert_eq!(read_all(&store, "x.4").await, b"second");
    }

    #[tokio::test]
    async fn test_list_skips_hidden_files_and_directories() {
        let (store, _temp_dir) = create_test_store().await;
        std::fs::write(store.data_dir().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(store.data_dir().join("subdir")).unwrap();
        std::fs::write(store.data_dir().join("b.2"), b"x").unwrap();
        std::fs::write(store.data_dir().join("a.1"), b"x").unwrap();

        assert_eq!(
            store.list().await.unwrap(),
            vec!["a.1".to_string(), "b.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_skips_names_unfit_for_a_listing() {
        let (store, _temp_dir) = create_test_store().await;
        std::fs::write(store.data_dir().join("a\nb.1"), b"x").unwrap();
        std::fs::write(store.data_dir().join("cr\r.2"), b"x").unwrap();
        std::fs::write(store.data_dir().join("ok.3"), b"x").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["ok.3".to_string()]);
    }

    #[tokio::test]
    async fn test_long_names_fit_alongside_temporaries() {
        let (store, _temp_dir) = create_test_store().await;
        let name = format!("{}.1", "n".repeat(250));

        let mut writer = store.create(&name).await.unwrap();
        writer.write(b"long").await.unwrap();
        assert_eq!(writer.commit().await.unwrap(), 4);

        assert_eq!(read_all(&store, &name).await, b"long");
        assert_eq!(store.list().await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let (store, _temp_dir) = create_test_store().await;
        assert!(matches!(
            store.open("nothing.1").await,
            Err(ChunkServerError::BlobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let (store, _temp_dir) = create_test_store().await;
        for name in ["../etc/passwd", "..", ".hidden.1", "a/b.1", ""] {
            assert!(
                matches!(
                    store.create(name).await,
                    Err(ChunkServerError::InvalidBlobName { .. })
                ),
                "{:?} should be rejected",
                name
            );
        }
    }
}
