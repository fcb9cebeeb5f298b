/// Filesystem object store backend.
/// Objects live under a sharded tree keyed by their content address; writes
/// go through a temp file and rename. Presigned URLs carry an HMAC-SHA256
/// signature over the key and expiry.
use super::{BatchDeleteSummary, ObjectMeta, ObjectStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies presigned download URLs
#[derive(Clone)]
pub struct Presigner {
    secret: Vec<u8>,
    base_url: String,
}

impl Presigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| Error::crypto("Invalid presign secret"))
    }

    fn message(key: &str, expires_unix: u64) -> Vec<u8> {
        format!("{}\n{}", key, expires_unix).into_bytes()
    }

    /// Hex signature over (key, expiry)
    pub fn sign(&self, key: &str, expires_unix: u64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(&Self::message(key, expires_unix));
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Full presigned URL for a GET
    pub fn presign(&self, key: &str, expires_in: Duration) -> Result<String> {
        let expires_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + expires_in.as_secs();
        let signature = self.sign(key, expires_unix)?;
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(key),
            expires_unix,
            signature
        ))
    }

    /// Constant-time verification; expired signatures never pass
    pub fn verify(&self, key: &str, expires_unix: u64, signature_hex: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > expires_unix {
            return false;
        }
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(&Self::message(key, expires_unix));
        mac.verify_slice(&signature).is_ok()
    }
}

/// Sharded filesystem store
pub struct FsObjectStore {
    base_dir: PathBuf,
    presigner: Presigner,
}

impl FsObjectStore {
    pub fn new(base_dir: impl AsRef<Path>, presigner: Presigner) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            presigner,
        }
    }

    pub fn presigner(&self) -> &Presigner {
        &self.presigner
    }

    /// Keys are relative paths within the tree; reject anything that could
    /// escape the base directory
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(Error::storage(format!("Invalid object key: {}", key)));
        }
        Ok(self.base_dir.join(key))
    }

    async fn walk_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.base_dir.exists() {
            return Ok(keys);
        }
        let mut stack = vec![self.base_dir.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Error::storage(format!("Failed to list store: {}", e)))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage(format!("Failed to read store entry: {}", e)))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.base_dir) {
                    keys.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.key_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(ObjectMeta { size: meta.len() })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("HEAD {} failed: {}", key, e))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("GET {} failed: {}", key, e))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("Failed to create shard dir: {}", e)))?;
        }

        // Write to a sibling temp file, then rename into place
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| Error::storage(format!("Failed to create object file: {}", e)))?;
        if let Err(e) = file.write_all(data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::storage(format!("Failed to write object: {}", e)));
        }
        drop(file);
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::storage(format!("Failed to finalize object: {}", e)))?;
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<BatchDeleteSummary> {
        let mut summary = BatchDeleteSummary::default();
        for key in keys {
            let path = match self.key_path(key) {
                Ok(p) => p,
                Err(_) => {
                    summary.failed += 1;
                    continue;
                }
            };
            match fs::remove_file(&path).await {
                Ok(()) => summary.deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => summary.deleted += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Object delete failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let keys = self.walk_keys().await?;
        Ok(keys
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.presigner.presign(key, expires_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> FsObjectStore {
        FsObjectStore::new(dir, Presigner::new(b"test-secret".to_vec(), "http://localhost/objects"))
    }

    #[tokio::test]
    async fn test_put_head_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.put("ab/cd/abcdef", b"payload").await.unwrap();
        let meta = store.head("ab/cd/abcdef").await.unwrap().unwrap();
        assert_eq!(meta.size, 7);
        assert_eq!(store.get("ab/cd/abcdef").await.unwrap().unwrap(), b"payload");

        let summary = store
            .delete_batch(&["ab/cd/abcdef".to_string(), "ab/cd/missing".to_string()])
            .await
            .unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.failed, 0);
        assert!(store.head("ab/cd/abcdef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.put("aa/bb/one", b"1").await.unwrap();
        store.put("aa/cc/two", b"2").await.unwrap();
        store.put("zz/dd/three", b"3").await.unwrap();

        let mut keys = store.list_prefix("aa/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["aa/bb/one", "aa/cc/two"]);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.get("/abs").await.is_err());
        assert!(store.get("a//b").await.is_err());
    }

    #[test]
    fn test_presign_round_trip() {
        let presigner = Presigner::new(b"s3cret".to_vec(), "http://localhost/objects");
        let url = presigner.presign("ab/cd/key", Duration::from_secs(900)).unwrap();
        assert!(url.starts_with("http://localhost/objects/"));
        assert!(url.contains("expires="));
        assert!(url.contains("signature="));

        let expires: u64 = url
            .split("expires=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let signature = url.split("signature=").nth(1).unwrap();
        assert!(presigner.verify("ab/cd/key", expires, signature));
        assert!(!presigner.verify("ab/cd/other", expires, signature));
        assert!(!presigner.verify("ab/cd/key", expires, "deadbeef"));
    }

    #[test]
    fn test_presign_expiry() {
        let presigner = Presigner::new(b"s3cret".to_vec(), "http://localhost/objects");
        let past = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 10;
        let signature = presigner.sign("k", past).unwrap();
        assert!(!presigner.verify("k", past, &signature));
    }
}
