//! File-system backed key-value storage.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::KeyValueStorage;

/// Directory-scoped storage, one file per key.
///
/// Writes go to a temporary sibling file first and are renamed into place,
/// so a crash mid-write never leaves a torn value behind.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    directory: PathBuf,
}

impl DiskStorage {
    /// Open (creating if needed) a storage namespace rooted at `directory`.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", sanitize_key(key)))
    }
}

impl KeyValueStorage for DiskStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(key.to_string()))
            }
            Err(error) => Err(Error::Io(error)),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let write = async {
            tokio::fs::write(&tmp, value).await?;
            tokio::fs::rename(&tmp, &path).await
        };
        write.await.map_err(|source| Error::Write {
            key: key.to_string(),
            source,
        })
    }
}

/// Map a logical key to a safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn read_of_missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path()).await.unwrap();
        let error = storage.read("absent").await.unwrap_err();
        assert!(matches!(error, Error::NotFound(key) if key == "absent"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path()).await.unwrap();
        storage.write("all-matches", b"[1,2,3]").await.unwrap();
        assert_eq!(storage.read("all-matches").await.unwrap(), b"[1,2,3]");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_replaces_previous_value() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path()).await.unwrap();
        storage.write("uploaded", b"old").await.unwrap();
        storage.write("uploaded", b"new").await.unwrap();
        assert_eq!(storage.read("uploaded").await.unwrap(), b"new");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn json_helpers_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path()).await.unwrap();
        storage.write_json("ids", &vec![1u64, 2, 3]).await.unwrap();
        let back: Vec<u64> = storage.read_json("ids").await.unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn sanitize_key_keeps_safe_characters() {
        assert_eq!(sanitize_key("favorite-teams"), "favorite-teams");
        assert_eq!(sanitize_key("up/loaded token"), "up-loaded-token");
    }
}
