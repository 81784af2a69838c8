//! Blob store backends and gzip JSON encoding

use super::{Blob, BlobHeaders, BlobStore};
use crate::error::{AnchorError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Suffix of the sidecar file holding a blob's headers
const META_SUFFIX: &str = ".meta";
/// Suffix of a file still being written; renamed into place when complete
const TMP_SUFFIX: &str = ".tmp";

pub fn gzip_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub fn gunzip_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_reader(GzDecoder::new(body))
        .map_err(|e| AnchorError::Codec(format!("gzip json: {}", e)))
}

/// In-memory blob store, ordered by key
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Blob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, headers: BlobHeaders) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(
            key.to_string(),
            Blob {
                key: key.to_string(),
                body,
                headers,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<Blob>> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, blob)| blob.clone())
            .collect())
    }
}

/// Filesystem-backed blob store
///
/// A key maps to a relative path under `root`; headers are kept in a
/// `<key>.meta` JSON sidecar. Files are written under a `.tmp` name and
/// renamed into place, so a listed blob is always complete.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && !key.ends_with(META_SUFFIX)
            && !key.ends_with(TMP_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AnchorError::InvalidInput(format!("invalid blob key {:?}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn meta_path(path: &Path) -> PathBuf {
        Self::with_suffix(path, META_SUFFIX)
    }

    /// Write `contents` next to `path` and rename it over `path`
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = Self::with_suffix(path, TMP_SUFFIX);
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_blob(&self, key: String, path: &Path) -> Result<Blob> {
        let body = tokio::fs::read(path).await?;
        let headers = match tokio::fs::read(Self::meta_path(path)).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BlobHeaders::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Blob { key, body, headers })
    }

    /// Keys of every stored blob, relative to `root` with `/` separators
    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.ends_with(META_SUFFIX) && !key.ends_with(TMP_SUFFIX) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, headers: BlobHeaders) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Self::write_atomic(&path, &body).await?;
        Self::write_atomic(&Self::meta_path(&path), &serde_json::to_vec(&headers)?).await?;
        debug!("Stored blob {}", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let path = self.path_for(key)?;
        match tokio::fs::try_exists(&path).await? {
            true => Ok(Some(self.read_blob(key.to_string(), &path).await?)),
            false => Ok(None),
        }
    }

    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<Blob>> {
        let mut blobs = Vec::new();
        for key in self.all_keys().await? {
            if key.starts_with(prefix) {
                let path = self.path_for(&key)?;
                blobs.push(self.read_blob(key, &path).await?);
            }
        }
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_json_round_trip() {
        let value = serde_json::json!({ "links": ["aa", "bb"] });
        let body = gzip_json(&value).unwrap();
        assert_eq!(&body[..2], &[0x1f, 0x8b]);

        let decoded: serde_json::Value = gunzip_json(&body).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_gunzip_rejects_plain_json() {
        let result: Result<serde_json::Value> = gunzip_json(b"{}");
        assert!(matches!(result, Err(AnchorError::Codec(_))));
    }

    #[tokio::test]
    async fn test_memory_prefix_listing_is_sorted_and_bounded() {
        let store = MemoryBlobStore::new();
        for key in ["01/b", "02/a", "01/a", "010/x"] {
            store.put(key, vec![1], BlobHeaders::default()).await.unwrap();
        }

        let keys: Vec<String> = store
            .list_with_prefix("01/")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["01/a", "01/b"]);
    }

    #[tokio::test]
    async fn test_fs_store_round_trip_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .put("00000000000000000001/5/abc.json", vec![1, 2, 3], BlobHeaders::gzipped_json())
            .await
            .unwrap();
        store
            .put("00000000000000000002/7/def.json", vec![4], BlobHeaders::default())
            .await
            .unwrap();

        let listed = store.list_with_prefix("00000000000000000001/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "00000000000000000001/5/abc.json");
        assert_eq!(listed[0].body, vec![1, 2, 3]);
        assert_eq!(listed[0].headers, BlobHeaders::gzipped_json());

        assert!(store.get("00000000000000000009/1/x.json").await.unwrap().is_none());
        assert_eq!(store.list_with_prefix("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let result = store.put("../outside.json", vec![], BlobHeaders::default()).await;
        assert!(matches!(result, Err(AnchorError::InvalidInput(_))));

        let result = store.put("00000000000000000000/1/abc.json.tmp", vec![], BlobHeaders::default()).await;
        assert!(matches!(result, Err(AnchorError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_fs_store_skips_interrupted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let key = "00000000000000000000/1/abc.json";
        let body = gzip_json(&serde_json::json!({ "links": ["aa"] })).unwrap();

        // a crash mid-write leaves only a truncated temp file behind
        let generation = dir.path().join("00000000000000000000/1");
        std::fs::create_dir_all(&generation).unwrap();
        std::fs::write(generation.join("abc.json.tmp"), &body[..body.len() / 2]).unwrap();
        std::fs::write(generation.join("def.json.meta.tmp"), b"{").unwrap();

        assert!(store.list_with_prefix("00000000000000000000/").await.unwrap().is_empty());
        assert!(store.get(key).await.unwrap().is_none());

        store.put(key, body.clone(), BlobHeaders::gzipped_json()).await.unwrap();
        let listed = store.list_with_prefix("00000000000000000000/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, key);
        let decoded: serde_json::Value = gunzip_json(&listed[0].body).unwrap();
        assert_eq!(decoded["links"][0], "aa");
        assert!(!generation.join("abc.json.tmp").exists());
    }
}
