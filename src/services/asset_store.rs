//! src/services/asset_store.rs
//!
//! AssetStore: local-disk object store for product images. Uploads are
//! written beneath `base_path/{shard}/{shard}/{key}` and exposed under
//! `public_url/{key}.{ext}`. It also serves as the [`DeletionGateway`] for
//! the image lifecycle.

use crate::{
    images::gateway::{DeletionGateway, GatewayError},
    models::object_ref::StorageKey,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("unsupported image type `{0}`; allowed: image/jpeg, image/png")]
    UnsupportedType(String),
    #[error("file content is not a valid `{0}` image")]
    ContentMismatch(&'static str),
    #[error("file exceeds the {limit} byte upload limit")]
    TooLarge { limit: u64 },
    #[error("invalid asset key")]
    InvalidKey,
    #[error("asset `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AssetStoreResult<T> = Result<T, AssetStoreError>;

/// An uploaded asset: its public URL and the key it is stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAsset {
    pub url: String,
    pub key: StorageKey,
}

#[derive(Clone, Debug)]
pub struct AssetStore {
    /// Base directory on disk where asset payloads are stored.
    pub base_path: PathBuf,
    /// URL prefix under which assets are served, without trailing slash.
    public_url: String,
    /// Single path segment every new key is created in. Keys must be
    /// `{folder}/{name}` for the URL to resolve back to them.
    folder: String,
    max_bytes: u64,
}

const MAX_KEY_LEN: usize = 512;
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const SNIFF_LEN: usize = 8;
const MAX_STEM_LEN: usize = 64;

impl AssetStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        folder: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            folder: folder.into().trim_matches('/').to_string(),
            max_bytes,
        }
    }

    /// Rejects keys that could escape `base_path`.
    fn ensure_key_safe(&self, key: &str) -> AssetStoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(AssetStoreError::InvalidKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(AssetStoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(AssetStoreError::InvalidKey);
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), as lowercase hex bytes.
    fn key_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn asset_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::key_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Check an upload's content type before any bytes are stored.
    pub fn accepts(&self, content_type: Option<&str>) -> AssetStoreResult<()> {
        extension_for(content_type).map(|_| ())
    }

    /// Check that `bytes` start with the signature of the declared type.
    pub fn check_signature(&self, content_type: Option<&str>, bytes: &[u8]) -> AssetStoreResult<()> {
        let ext = extension_for(content_type)?;
        if content_type_for(ext) == sniff_content_type(bytes) {
            Ok(())
        } else {
            Err(AssetStoreError::ContentMismatch(content_type_for(ext)))
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Fresh key for an upload: `{folder}/product_{millis}_{uuid}_{stem}`.
    ///
    /// The timestamp and UUID make every key unique, so two products can
    /// never end up referencing the same object.
    fn new_key(&self, original_name: &str) -> String {
        format!(
            "{}/product_{}_{}_{}",
            self.folder,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            sanitize_stem(original_name)
        )
    }

    /// Stream an image to disk and return its public URL.
    ///
    /// - Rejects content types other than JPEG and PNG.
    /// - Writes to a temporary file, enforcing the size limit as bytes arrive.
    /// - Renames into place once fully written and synced.
    pub async fn upload_stream<S>(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        stream: S,
    ) -> AssetStoreResult<StoredAsset>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let ext = extension_for(content_type)?;
        let key = self.new_key(original_name);
        self.ensure_key_safe(&key)?;

        let file_path = self.asset_path(&key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            AssetStoreError::Io(io::Error::other("asset path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(AssetStoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            if size_bytes > self.max_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(AssetStoreError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            let wanted = SNIFF_LEN - head.len();
            head.extend_from_slice(&chunk[..wanted.min(chunk.len())]);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(AssetStoreError::Io(err));
            }
        }
        if let Err(err) = self.check_signature(content_type, &head) {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AssetStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AssetStoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AssetStoreError::Io(err));
        }

        debug!(key = %key, size_bytes, "stored asset {}", file_path.display());
        Ok(StoredAsset {
            url: format!("{}/{}.{}", self.public_url, key, ext),
            key: StorageKey::new(key),
        })
    }

    /// Open a stored asset for streaming out.
    pub async fn open(&self, key: &StorageKey) -> AssetStoreResult<File> {
        self.ensure_key_safe(key.as_str())?;
        File::open(self.asset_path(key.as_str()))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    AssetStoreError::NotFound(key.to_string())
                } else {
                    AssetStoreError::Io(err)
                }
            })
    }

    /// Open a stored asset together with the content type its leading
    /// bytes identify.
    pub async fn open_image(&self, key: &StorageKey) -> AssetStoreResult<(File, &'static str)> {
        let mut file = self.open(key).await?;
        let mut head = [0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            let n = file.read(&mut head[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        file.seek(SeekFrom::Start(0)).await?;
        Ok((file, sniff_content_type(&head[..filled])))
    }

    /// Remove a stored asset and prune the shard directories it leaves empty.
    pub async fn remove(&self, key: &StorageKey) -> AssetStoreResult<()> {
        self.ensure_key_safe(key.as_str())?;
        let file_path = self.asset_path(key.as_str());
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed asset file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AssetStoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(AssetStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    /// Remove empty directories upward until `stop`, a non-empty directory,
    /// or an unexpected I/O error.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl DeletionGateway for AssetStore {
    async fn delete(&self, key: &StorageKey) -> Result<(), GatewayError> {
        match self.remove(key).await {
            Ok(()) => Ok(()),
            Err(AssetStoreError::NotFound(_)) => Err(GatewayError::NotFound(key.clone())),
            Err(AssetStoreError::InvalidKey) => Err(GatewayError::InvalidKey(key.clone())),
            Err(err) => Err(GatewayError::Failed {
                key: key.clone(),
                reason: err.to_string(),
            }),
        }
    }
}

/// File extension for an accepted upload content type.
fn extension_for(content_type: Option<&str>) -> AssetStoreResult<&'static str> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        _ => Err(AssetStoreError::UnsupportedType(essence)),
    }
}

/// Content type to serve for a requested file extension.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Image type identified by the leading bytes of a file.
fn sniff_content_type(head: &[u8]) -> &'static str {
    if head.starts_with(PNG_SIGNATURE) {
        "image/png"
    } else if head.starts_with(JPEG_SIGNATURE) {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

/// Stem of the uploaded file name, reduced to characters that are safe in
/// both a path segment and the comma-joined image list.
fn sanitize_stem(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let stem = base.split('.').next().unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}
