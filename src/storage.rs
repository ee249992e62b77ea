// 🗄️ Object Storage - uploaded statements and generated artifacts, by key
//
//   incoming/<job-uuid>/<sanitised file name>   raw uploads
//   parsed/<job-uuid>/<stem>.<ext>              generated artifacts

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::emit::{file_stem_of, OutputFormat};
use crate::error::{ConvertError, Result};

pub const INCOMING_PREFIX: &str = "incoming";
pub const PARSED_PREFIX: &str = "parsed";

const META_SUFFIX: &str = ".meta.json";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// KEYS
// ============================================================================

/// Reduce an uploaded file name to something safe as a single key segment
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "statement".to_string()
    } else {
        cleaned
    }
}

pub fn source_key(job_id: Uuid, file_name: &str) -> String {
    format!("{}/{}/{}", INCOMING_PREFIX, job_id, sanitize_file_name(file_name))
}

pub fn output_key(job_id: Uuid, source_file_name: &str, format: OutputFormat) -> String {
    format!(
        "{}/{}/{}.{}",
        PARSED_PREFIX,
        job_id,
        file_stem_of(&sanitize_file_name(source_file_name)),
        format.extension()
    )
}

// ============================================================================
// OBJECT STORE TRAIT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Key/value blob storage for raw uploads and generated artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Removing a key that holds nothing is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================================
// LOCAL FILESYSTEM
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    content_type: String,
    size: usize,
    stored_at: DateTime<Utc>,
}

/// Objects as files under a root directory, content type in a `.meta.json` sidecar
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && !key.ends_with(META_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(ConvertError::Storage(anyhow!("Invalid object key: {:?}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size: bytes.len(),
            stored_at: Utc::now(),
        };

        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let meta_json = serde_json::to_vec(&meta)?;
            tokio::fs::write(Self::meta_path(&path), meta_json)
                .await
                .with_context(|| format!("Failed to write metadata for {}", key))?;
            anyhow::Ok(())
        };

        write.await.map_err(ConvertError::Storage)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.path_for(key)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConvertError::Storage(
                    anyhow::Error::new(e).context(format!("Failed to read {}", path.display())),
                ))
            }
        };

        // A missing or damaged sidecar only loses the content type
        let content_type = match tokio::fs::read(Self::meta_path(&path)).await {
            Ok(raw) => serde_json::from_slice::<ObjectMeta>(&raw)
                .map(|m| m.content_type)
                .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string()),
            Err(_) => DEFAULT_CONTENT_TYPE.to_string(),
        };

        Ok(Some(StoredObject {
            key: key.to_string(),
            content_type,
            bytes,
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
            .map_err(ConvertError::Storage)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        for target in [Self::meta_path(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ConvertError::Storage(
                        anyhow::Error::new(e)
                            .context(format!("Failed to remove {}", target.display())),
                    ))
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let object = StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            bytes,
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Statement Jan.pdf"), "Statement Jan.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\jan.csv"), "jan.csv");
        assert_eq!(sanitize_file_name("a;b|c.csv"), "a_b_c.csv");
        assert_eq!(sanitize_file_name(".."), "statement");
        assert_eq!(sanitize_file_name(""), "statement");
    }

    #[test]
    fn test_keys() {
        let id = Uuid::nil();
        assert_eq!(
            source_key(id, "Jan 2024.pdf"),
            "incoming/00000000-0000-0000-0000-000000000000/Jan 2024.pdf"
        );
        assert_eq!(
            output_key(id, "Jan 2024.pdf", OutputFormat::Qbo),
            "parsed/00000000-0000-0000-0000-000000000000/Jan 2024.qbo"
        );
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        assert!(!store.exists("parsed/a/jan.qbo").await.unwrap());
        store
            .put("parsed/a/jan.qbo", b"OFXHEADER:100".to_vec(), "application/vnd.intu.qbo")
            .await
            .unwrap();

        assert!(store.exists("parsed/a/jan.qbo").await.unwrap());
        let object = store.get("parsed/a/jan.qbo").await.unwrap().unwrap();
        assert_eq!(object.bytes, b"OFXHEADER:100");
        assert_eq!(object.content_type, "application/vnd.intu.qbo");
        assert!(store.get("parsed/a/feb.qbo").await.unwrap().is_none());

        store.delete("parsed/a/jan.qbo").await.unwrap();
        assert!(!store.exists("parsed/a/jan.qbo").await.unwrap());
        assert!(!dir.path().join("parsed/a/jan.qbo.meta.json").exists());
        store.delete("parsed/a/jan.qbo").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        for key in ["../outside", "/etc/passwd", "", "parsed/a/jan.qbo.meta.json"] {
            let result = store.put(key, vec![], "text/plain").await;
            assert!(matches!(result, Err(ConvertError::Storage(_))), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryObjectStore::new();
        store.put("incoming/a/jan.csv", b"x".to_vec(), "text/csv").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.exists("incoming/a/jan.csv").await.unwrap());
        assert_eq!(store.keys().await, vec!["incoming/a/jan.csv".to_string()]);

        store.delete("incoming/a/jan.csv").await.unwrap();
        assert!(store.is_empty().await);
    }
}
