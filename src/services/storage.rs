use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Result of a durable blob write
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub size: i64,
    pub sha256: String,
}

/// Failures callers are expected to branch on; everything else is I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("blob exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("blob payload is empty")]
    Empty,

    #[error("blob '{0}' already exists")]
    AlreadyExists(String),

    #[error("blob '{0}' not found")]
    NotFound(String),

    #[error("invalid blob key '{0}'")]
    InvalidKey(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Streams `reader` into `key`. The blob only becomes visible once every
    /// byte is on disk; a failed write leaves nothing behind.
    async fn put_stream<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StoredBlob>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Where `key` lives, as recorded in the record store.
    fn location(&self, key: &str) -> String;
    async fn health_check(&self) -> bool;
}

/// Flat directory of blobs on the local filesystem
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root).await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
            || key.chars().any(|c| c.is_control())
        {
            return Err(anyhow!(BlobError::InvalidKey(key.to_string())));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_stream<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StoredBlob> {
        let target = self.path_for(key)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(anyhow!(BlobError::AlreadyExists(key.to_string())));
        }

        // Dropping the temp file on any early return removes the partial write
        let temp_file = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.root)?;
        let mut writer = tokio::fs::File::from_std(temp_file.reopen()?);

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut total_size: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            total_size += n as u64;
            if total_size > max_size {
                return Err(anyhow!(BlobError::TooLarge { limit: max_size }));
            }
            hasher.update(&buffer[..n]);
            writer.write_all(&buffer[..n]).await?;
        }

        if total_size == 0 {
            return Err(anyhow!(BlobError::Empty));
        }

        writer.flush().await?;
        writer.sync_all().await?;
        drop(writer);

        let root = self.root.clone();
        let persist_target = target;
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            temp_file
                .persist_noclobber(&persist_target)
                .map_err(|e| {
                    if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                        anyhow!(BlobError::AlreadyExists(owned_key))
                    } else {
                        anyhow!(e.error)
                    }
                })?;
            #[cfg(unix)]
            std::fs::File::open(&root)?.sync_all()?;
            Ok(())
        })
        .await??;

        Ok(StoredBlob {
            key: key.to_string(),
            size: total_size as i64,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(anyhow!(BlobError::NotFound(key.to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        let path = self.path_for(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(anyhow!(BlobError::NotFound(key.to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }

    async fn health_check(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

/// Matches a storage failure against a specific `BlobError`.
pub fn blob_error(err: &anyhow::Error) -> Option<&BlobError> {
    err.downcast_ref::<BlobError>()
}
